//! Tracker protocols (BEP-3, BEP-15)
//!
//! HTTP and UDP announce for peer discovery, with fallback across a
//! descriptor's tracker list. Scrape is not supported.

mod client;
mod error;
mod http;
mod response;
mod state;
mod udp;

pub use client::TrackerClient;
pub use error::TrackerError;
pub use http::{parse_announce_body, HttpTracker};
pub use response::{
    parse_compact_peers, parse_compact_peers_until_zero, AnnounceRequest, AnnounceResponse,
    CompactPeer, TrackerEvent,
};
pub use state::TrackerState;
pub use udp::{
    decode_announce_response, decode_connect_response, encode_announce_request,
    encode_connect_request, UdpTracker,
};

#[cfg(test)]
mod tests;
