//! Swarm model: pieces, blocks and the peers offering them.
//!
//! A [`Swarm`] is shared by every worker of a session. Received blocks go
//! through [`Swarm::assemble`], which stores them in their piece and
//! verifies the piece against its SHA-1 digest once the last block lands.

mod peer_view;
mod piece;
mod state;

pub use peer_view::{PeerSlot, PeerView};
pub use piece::{Block, Pending, Piece, Placement, Verification};
pub use state::{Assembly, Swarm};
