//! Transfer sessions and the inbound listener.
//!
//! A [`Session`] owns one transfer. Its driver loop runs the scheduler,
//! hands out upload slots and broadcasts `have`. Each peer connection gets
//! its own worker task that reads the wire, assembles blocks and writes
//! verified pieces to the sink.
//!
//! A [`Client`] holds the peer id and the info-hash to session table.
//! Its [`Listener`] reads the handshake of every inbound connection and
//! routes it to the matching session.

mod client;
mod driver;
mod error;
mod event;
mod worker;

pub use client::{Client, Listener};
pub use driver::{Session, SessionHandle, SessionStats};
pub use error::SessionError;
pub use event::InboundPeer;
