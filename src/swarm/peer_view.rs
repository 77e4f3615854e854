use crate::peer::{Bitfield, ChokingState, ConnectionState, PeerId};
use std::fmt;
use std::net::SocketAddr;

/// Stable handle for a peer within one session. Slots are handed out in
/// increasing order and never reused, so ordering by slot is ordering by
/// arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerSlot(pub u32);

impl fmt::Display for PeerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the session knows about one remote peer.
#[derive(Debug, Clone)]
pub struct PeerView {
    pub slot: PeerSlot,
    pub addr: SocketAddr,
    pub peer_id: Option<PeerId>,
    pub state: ConnectionState,
    pub choking: ChokingState,
    /// Pieces the remote has announced, via `bitfield` or `have`.
    pub bitfield: Bitfield,
    pub downloaded: u64,
    pub uploaded: u64,
}

impl PeerView {
    pub fn new(slot: PeerSlot, addr: SocketAddr, piece_count: usize) -> Self {
        Self {
            slot,
            addr,
            peer_id: None,
            state: ConnectionState::Connecting,
            choking: ChokingState::default(),
            bitfield: Bitfield::new(piece_count),
            downloaded: 0,
            uploaded: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Active
    }
}

/// Point-in-time copy of the fields the scheduler reads.
#[derive(Debug, Clone)]
pub(crate) struct PeerSnapshot {
    pub slot: PeerSlot,
    pub can_request: bool,
    pub bitfield: Bitfield,
}
