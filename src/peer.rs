//! Peer wire protocol (BEP-3)
//!
//! Handshake, length-prefixed message framing, bitfields and per-connection
//! choke/interest state. No extensions are negotiated: the reserved
//! handshake bytes are always zero.

mod bitfield;
mod choking;
mod connection;
mod error;
mod message;
mod peer_id;
mod piece;
mod transport;

pub use bitfield::Bitfield;
pub use choking::{ChokingState, UploadSlots};
pub use connection::{ConnectionState, PeerConnection};
pub use error::PeerError;
pub use message::{Handshake, Message, MessageId};
pub use peer_id::PeerId;
pub use piece::{block_count, block_length, BlockRequest};
pub use transport::PeerTransport;

#[cfg(test)]
mod tests;
