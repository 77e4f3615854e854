//! swarmer - A BitTorrent swarm engine
//!
//! Downloads the content of a torrent descriptor from many peers at once:
//! trackers supply peer addresses, one task per connection speaks the peer
//! wire protocol, blocks arriving out of order are assembled into pieces
//! and checked against their SHA-1 digests, and a rarest-first scheduler
//! decides what to request next.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 Bencode encoding/decoding
//! - [`metainfo`] - BEP-3 torrent descriptors and info-hashes
//! - [`peer`] - BEP-3 peer wire protocol
//! - [`tracker`] - BEP-3/15 HTTP and UDP tracker announces
//! - [`swarm`] - Pieces, blocks, peer views and assembly
//! - [`scheduler`] - Rarest-first block scheduling
//! - [`storage`] - Byte sinks for verified pieces
//! - [`session`] - Per-transfer driver and the inbound listener
//!
//! The library logs through [`tracing`] and never installs a subscriber.

pub mod bencode;
pub mod config;
pub mod constants;
pub mod metainfo;
pub mod peer;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod swarm;
pub mod tracker;

#[cfg(test)]
mod test_util;

pub use bencode::{decode, encode, BencodeError, Value};
pub use config::ClientConfig;
pub use metainfo::{File, Info, InfoHash, Metainfo, MetainfoError};
pub use peer::{
    Bitfield, BlockRequest, Handshake, Message, PeerConnection, PeerError, PeerId,
};
pub use scheduler::{Assignment, Scheduler};
pub use session::{Client, Listener, Session, SessionError, SessionHandle, SessionStats};
pub use storage::{ByteSink, FileSink, MemorySink, StorageError};
pub use swarm::{Assembly, Swarm};
pub use tracker::{
    AnnounceRequest, AnnounceResponse, CompactPeer, HttpTracker, TrackerClient, TrackerError,
    TrackerEvent, UdpTracker,
};
