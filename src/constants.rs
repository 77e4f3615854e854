//! Protocol constants and tuning parameters.
//!
//! Wire-level values are fixed by the protocol. Timeouts and limits are the
//! defaults picked up by [`ClientConfig`](crate::config::ClientConfig) and can
//! be overridden there.

use std::time::Duration;

// ============================================================================
// Client identification
// ============================================================================

/// Client ID prefix for peer ID generation (Azureus-style)
pub const CLIENT_PREFIX: &[u8; 8] = b"-SW0100-";

/// User agent string for HTTP tracker requests
pub const USER_AGENT: &str = "swarmer/0.1.0";

// ============================================================================
// Ports
// ============================================================================

/// Default port for inbound peer connections
pub const DEFAULT_PORT: u16 = 6881;

// ============================================================================
// Connection limits
// ============================================================================

/// Maximum peer connections a session keeps open at once
pub const MAX_PEERS_PER_SESSION: usize = 50;

/// Maximum outstanding block requests to a single peer
pub const MAX_REQUESTS_PER_PEER: usize = 16;

/// Peers we keep unchoked for uploads
pub const UPLOAD_SLOTS: usize = 4;

/// Block requests a peer may have queued with us before further ones are dropped
pub const MAX_QUEUED_UPLOADS: usize = 256;

/// Capacity of per-worker command queues and the session event queue
pub const CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// Block and piece sizes
// ============================================================================

/// Standard block size (16KB)
pub const BLOCK_SIZE: u32 = 16384;

/// Largest request we will serve. Anything larger is treated as hostile.
pub const MAX_REQUEST_LENGTH: u32 = 131072;

/// Maximum frame length accepted on the wire (16MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

// ============================================================================
// Protocol constants
// ============================================================================

/// BitTorrent protocol string
pub const PROTOCOL_STRING: &[u8; 19] = b"BitTorrent protocol";

/// Handshake length: pstrlen + pstr + reserved + info hash + peer id
pub const HANDSHAKE_LEN: usize = 68;

/// Reserved bytes in handshake. No extensions are negotiated.
pub const RESERVED_BYTES: [u8; 8] = [0; 8];

// ============================================================================
// UDP tracker protocol constants
// ============================================================================

/// UDP tracker protocol ID (magic number)
pub const UDP_TRACKER_PROTOCOL_ID: u64 = 0x41727101980;

/// UDP tracker connect action
pub const UDP_ACTION_CONNECT: u32 = 0;

/// UDP tracker announce action
pub const UDP_ACTION_ANNOUNCE: u32 = 1;

/// UDP tracker error action
pub const UDP_ACTION_ERROR: u32 = 3;

/// Size of a UDP connect request
pub const UDP_CONNECT_LEN: usize = 16;

/// Size of a UDP announce request
pub const UDP_ANNOUNCE_LEN: usize = 98;

/// Offset of the peer list in a UDP announce response
pub const UDP_PEERS_OFFSET: usize = 20;

// ============================================================================
// Timeouts
// ============================================================================

/// TCP connection timeout
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Handshake timeout after TCP connect, and for inbound handshakes
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Peer read timeout. Must exceed the remote's keep-alive interval.
pub const PEER_READ_TIMEOUT: Duration = Duration::from_secs(180);

/// Peer write timeout
pub const PEER_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// An unanswered block request is released for reassignment after this long
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// UDP tracker read deadline per attempt
pub const UDP_TRACKER_TIMEOUT: Duration = Duration::from_secs(15);

/// Send attempts per UDP tracker request before giving up
pub const UDP_TRACKER_ATTEMPTS: u32 = 2;

/// A UDP tracker connection id stays valid for one minute
pub const UDP_CONNECTION_ID_LIFETIME: Duration = Duration::from_secs(60);

/// HTTP tracker request timeout
pub const HTTP_TRACKER_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Intervals
// ============================================================================

/// Keepalive message interval
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(115);

/// Peer worker housekeeping tick: keep-alive and read liveness checks
pub const PEER_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Scheduler tick when no event arrives
pub const SCHEDULER_INTERVAL: Duration = Duration::from_millis(500);

/// Announce interval used when the tracker does not give one
pub const TRACKER_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(1800);

/// Floor for tracker-provided intervals
pub const TRACKER_MIN_INTERVAL: Duration = Duration::from_secs(60);
