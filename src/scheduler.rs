//! Rarest-first piece scheduling.

use crate::peer::BlockRequest;
use crate::swarm::{PeerSlot, Swarm};
use std::collections::HashMap;
use std::time::Instant;

/// One block request to send to one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub peer: PeerSlot,
    pub request: BlockRequest,
}

/// Rarest-first block scheduler.
///
/// Each step walks the incomplete pieces from fewest holders to most (ties
/// by lower index) and hands the first unrequested block of each piece to
/// the first holder, in arrival order, that is not choking us and has
/// request capacity left. A piece gets at most one new request per step.
///
/// Planned blocks are reserved in the swarm immediately. A caller that
/// cannot deliver an assignment must [`Swarm::release`] it.
#[derive(Debug, Clone)]
pub struct Scheduler {
    max_requests_per_peer: usize,
}

impl Scheduler {
    pub fn new(max_requests_per_peer: usize) -> Self {
        Self {
            max_requests_per_peer: max_requests_per_peer.max(1),
        }
    }

    pub fn plan(&self, swarm: &Swarm) -> Vec<Assignment> {
        let peers = swarm.snapshot();
        if peers.is_empty() {
            return Vec::new();
        }

        let mut in_flight: HashMap<PeerSlot, usize> = HashMap::with_capacity(peers.len());
        let mut candidates: Vec<(usize, u32)> = Vec::new();

        for index in 0..swarm.piece_count() as u32 {
            let complete = swarm
                .with_piece(index, |piece| {
                    for peer in piece.pending() {
                        *in_flight.entry(peer).or_default() += 1;
                    }
                    piece.is_complete()
                })
                .unwrap_or(true);
            if complete {
                continue;
            }

            let rarity = peers
                .iter()
                .filter(|p| p.bitfield.has(index as usize))
                .count();
            if rarity > 0 {
                candidates.push((rarity, index));
            }
        }

        candidates.sort_unstable();

        let now = Instant::now();
        let mut plan = Vec::new();

        for (_, index) in candidates {
            let assignment = swarm.with_piece(index, |piece| {
                let request = piece.next_request()?;
                let peer = peers
                    .iter()
                    .filter(|p| p.can_request && p.bitfield.has(index as usize))
                    .map(|p| p.slot)
                    .find(|slot| {
                        in_flight.get(slot).copied().unwrap_or(0) < self.max_requests_per_peer
                    })?;
                piece.mark_requested(request.offset, peer, now);
                Some(Assignment { peer, request })
            });

            if let Some(Some(assignment)) = assignment {
                *in_flight.entry(assignment.peer).or_default() += 1;
                plan.push(assignment);
            }
        }

        if !plan.is_empty() {
            tracing::trace!(requests = plan.len(), "scheduled block requests");
        }
        plan
    }
}
