use crate::peer::{BlockRequest, Handshake, PeerTransport};
use crate::swarm::PeerSlot;
use crate::tracker::{AnnounceResponse, TrackerError};
use std::net::SocketAddr;

/// Worker (and announce task) to session.
#[derive(Debug)]
pub(crate) enum SessionEvent {
    /// Something the scheduler reads changed: availability, choke state or
    /// a stored block.
    Updated,
    Interest { slot: PeerSlot, interested: bool },
    /// Verified, written and recorded locally.
    PieceCompleted { index: u32 },
    Closed { slot: PeerSlot },
    Announced(Result<AnnounceResponse, TrackerError>),
}

/// Session to one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PeerCommand {
    Request(BlockRequest),
    Have(u32),
    Choke,
    Unchoke,
}

/// An inbound connection whose handshake has been read and matched to a
/// session.
pub struct InboundPeer {
    pub addr: SocketAddr,
    pub transport: PeerTransport,
    pub handshake: Handshake,
}
