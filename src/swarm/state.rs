use super::peer_view::{PeerSlot, PeerSnapshot, PeerView};
use super::piece::{Piece, Placement, Verification};
use crate::metainfo::Info;
use crate::peer::{Bitfield, BlockRequest};
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Outcome of handing a received block to the swarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembly {
    /// Stored; the piece still has empty blocks.
    Stored,
    /// Stored and the piece verified. `data` must be written at `offset`
    /// before the piece is advertised.
    Completed { index: u32, offset: u64, data: Bytes },
    /// The final block filled the piece but the digest was wrong. Every
    /// block of the piece is empty again.
    HashMismatch { index: u32 },
    /// Dropped without changing any state.
    Rejected(Placement),
    /// No piece has this index.
    UnknownPiece,
}

/// Shared state of one transfer: the piece set, the peer arena and the
/// transfer counters.
///
/// Each piece sits behind its own lock so workers assembling different
/// pieces never contend. No lock on a piece is held while the peer map is
/// touched, and the other way round.
pub struct Swarm {
    pieces: Vec<Mutex<Piece>>,
    peers: DashMap<PeerSlot, PeerView>,
    next_slot: AtomicU32,
    /// Pieces verified and written to the sink.
    have: RwLock<Bitfield>,
    piece_length: u64,
    total_length: u64,
    uploaded: AtomicU64,
    downloaded: AtomicU64,
}

impl Swarm {
    pub fn new(info: &Info) -> Self {
        let pieces = info
            .pieces
            .iter()
            .enumerate()
            .map(|(i, hash)| Mutex::new(Piece::new(i as u32, *hash, info.piece_len(i) as u32)))
            .collect();

        Self {
            pieces,
            peers: DashMap::new(),
            next_slot: AtomicU32::new(0),
            have: RwLock::new(Bitfield::new(info.piece_count())),
            piece_length: info.piece_length,
            total_length: info.total_length,
            uploaded: AtomicU64::new(0),
            downloaded: AtomicU64::new(0),
        }
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Nominal piece length; only the last piece may be shorter.
    pub fn piece_length(&self) -> u64 {
        self.piece_length
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Actual length of piece `index`.
    pub fn piece_size(&self, index: u32) -> Option<u32> {
        self.pieces.get(index as usize).map(|p| p.lock().length())
    }

    /// Absolute byte offset of piece `index` in the sink.
    pub fn piece_offset(&self, index: u32) -> u64 {
        self.piece_length * index as u64
    }

    pub(crate) fn with_piece<R>(&self, index: u32, f: impl FnOnce(&mut Piece) -> R) -> Option<R> {
        self.pieces.get(index as usize).map(|p| f(&mut p.lock()))
    }

    // ========================================================================
    // Peer arena
    // ========================================================================

    /// Registers a peer and returns its slot.
    pub fn add_peer(&self, addr: SocketAddr) -> PeerSlot {
        let slot = PeerSlot(self.next_slot.fetch_add(1, Ordering::Relaxed));
        self.peers
            .insert(slot, PeerView::new(slot, addr, self.piece_count()));
        slot
    }

    /// Drops a peer and releases every request that was waiting on it.
    pub fn remove_peer(&self, slot: PeerSlot) -> Option<PeerView> {
        let view = self.peers.remove(&slot).map(|(_, v)| v);
        self.release_peer(slot);
        view
    }

    pub fn peer<R>(&self, slot: PeerSlot, f: impl FnOnce(&PeerView) -> R) -> Option<R> {
        self.peers.get(&slot).map(|v| f(&v))
    }

    pub fn update_peer<R>(&self, slot: PeerSlot, f: impl FnOnce(&mut PeerView) -> R) -> Option<R> {
        self.peers.get_mut(&slot).map(|mut v| f(&mut v))
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn contains_addr(&self, addr: &SocketAddr) -> bool {
        self.peers.iter().any(|v| v.addr == *addr)
    }

    /// Slots of the peers that have announced piece `index`, in arrival
    /// order.
    pub fn holders(&self, index: u32) -> Vec<PeerSlot> {
        let mut slots: Vec<PeerSlot> = self
            .peers
            .iter()
            .filter(|v| v.bitfield.has(index as usize))
            .map(|v| v.slot)
            .collect();
        slots.sort_unstable();
        slots
    }

    /// Active peers in arrival order.
    pub(crate) fn snapshot(&self) -> Vec<PeerSnapshot> {
        let mut peers: Vec<PeerSnapshot> = self
            .peers
            .iter()
            .filter(|v| v.is_active())
            .map(|v| PeerSnapshot {
                slot: v.slot,
                can_request: v.choking.can_request(),
                bitfield: v.bitfield.clone(),
            })
            .collect();
        peers.sort_unstable_by_key(|p| p.slot);
        peers
    }

    // ========================================================================
    // Assembly
    // ========================================================================

    /// Places a received block and, when it fills its piece, verifies the
    /// piece. Completion is reported once per piece.
    pub fn assemble(&self, index: u32, begin: u32, data: Bytes) -> Assembly {
        let Some(slot) = self.pieces.get(index as usize) else {
            return Assembly::UnknownPiece;
        };

        let len = data.len() as u64;
        let mut piece = slot.lock();
        match piece.place(begin, data) {
            Placement::Stored => {}
            other => return Assembly::Rejected(other),
        }
        self.downloaded.fetch_add(len, Ordering::Relaxed);

        match piece.verify() {
            Verification::Incomplete => Assembly::Stored,
            Verification::Complete(data) => Assembly::Completed {
                index,
                offset: self.piece_offset(index),
                data,
            },
            Verification::Mismatch => Assembly::HashMismatch { index },
        }
    }

    /// Reserves the block named by `request` for `peer`.
    pub fn mark_requested(&self, request: &BlockRequest, peer: PeerSlot) -> bool {
        self.with_piece(request.piece, |p| {
            p.mark_requested(request.offset, peer, Instant::now())
        })
        .unwrap_or(false)
    }

    /// Returns the block named by `request` to the pool.
    pub fn release(&self, request: &BlockRequest) {
        self.with_piece(request.piece, |p| p.release(request.offset));
    }

    /// Returns every block reserved for `peer` to the pool.
    pub fn release_peer(&self, peer: PeerSlot) -> usize {
        self.pieces
            .iter()
            .map(|p| p.lock().release_peer(peer))
            .sum()
    }

    /// Returns blocks requested more than `timeout` ago to the pool.
    pub fn release_expired(&self, timeout: Duration) -> usize {
        let now = Instant::now();
        self.pieces
            .iter()
            .map(|p| p.lock().release_expired(now, timeout))
            .sum()
    }

    /// Records that piece `index` has been written out. Returns false if it
    /// was already recorded.
    pub fn mark_have(&self, index: u32) -> bool {
        let mut have = self.have.write();
        if have.has(index as usize) {
            return false;
        }
        have.set(index as usize)
    }

    /// Forgets a verified piece whose write failed so it is fetched again.
    pub fn reset_piece(&self, index: u32) {
        self.with_piece(index, |p| p.reset());
    }

    pub fn has_piece(&self, index: u32) -> bool {
        self.have.read().has(index as usize)
    }

    pub fn local_bitfield(&self) -> Bitfield {
        self.have.read().clone()
    }

    /// True once every piece is verified and written.
    pub fn is_complete(&self) -> bool {
        self.have.read().is_complete()
    }

    // ========================================================================
    // Counters
    // ========================================================================

    /// Bytes still missing, as reported to trackers.
    pub fn left(&self) -> u64 {
        let have = self.have.read();
        let held: u64 = (0..self.piece_count() as u64)
            .filter(|&i| have.has(i as usize))
            .map(|i| {
                let start = i * self.piece_length;
                self.piece_length.min(self.total_length.saturating_sub(start))
            })
            .sum();
        self.total_length.saturating_sub(held)
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    pub fn uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::Relaxed)
    }

    pub fn add_uploaded(&self, bytes: u64) {
        self.uploaded.fetch_add(bytes, Ordering::Relaxed);
    }
}
