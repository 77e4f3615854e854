//! Client configuration.
//!
//! Every field defaults to the matching value in [`constants`](crate::constants).

use std::time::Duration;

use crate::constants::{
    CONNECTION_TIMEOUT, DEFAULT_PORT, HANDSHAKE_TIMEOUT, KEEPALIVE_INTERVAL, MAX_PEERS_PER_SESSION,
    MAX_REQUESTS_PER_PEER, PEER_READ_TIMEOUT, PEER_WRITE_TIMEOUT, REQUEST_TIMEOUT,
    SCHEDULER_INTERVAL, UPLOAD_SLOTS,
};

/// Tunables shared by the listener and every session it owns.
///
/// ```
/// use swarmer::config::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::default()
///     .with_listen_port(51413)
///     .with_max_peers(20)
///     .with_scheduler_interval(Duration::from_millis(250));
/// assert_eq!(config.listen_port, 51413);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Port announced to trackers and bound for inbound peers.
    pub listen_port: u16,
    /// Open connections per session.
    pub max_peers: usize,
    /// Outstanding block requests per peer.
    pub max_requests_per_peer: usize,
    /// Peers unchoked for upload at once.
    pub upload_slots: usize,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub request_timeout: Duration,
    pub keepalive_interval: Duration,
    pub scheduler_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_PORT,
            max_peers: MAX_PEERS_PER_SESSION,
            max_requests_per_peer: MAX_REQUESTS_PER_PEER,
            upload_slots: UPLOAD_SLOTS,
            connect_timeout: CONNECTION_TIMEOUT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            read_timeout: PEER_READ_TIMEOUT,
            write_timeout: PEER_WRITE_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
            keepalive_interval: KEEPALIVE_INTERVAL,
            scheduler_interval: SCHEDULER_INTERVAL,
        }
    }
}

impl ClientConfig {
    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    pub fn with_max_peers(mut self, max_peers: usize) -> Self {
        self.max_peers = max_peers;
        self
    }

    pub fn with_max_requests_per_peer(mut self, max: usize) -> Self {
        self.max_requests_per_peer = max.max(1);
        self
    }

    pub fn with_upload_slots(mut self, slots: usize) -> Self {
        self.upload_slots = slots;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_scheduler_interval(mut self, interval: Duration) -> Self {
        self.scheduler_interval = interval;
        self
    }
}
