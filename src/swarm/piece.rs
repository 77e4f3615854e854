use super::peer_view::PeerSlot;
use crate::peer::{block_count, block_length, BlockRequest};
use bytes::{Bytes, BytesMut};
use sha1::{Digest, Sha1};
use std::time::{Duration, Instant};

/// A block request that has been sent and not yet answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pending {
    pub peer: PeerSlot,
    pub since: Instant,
}

/// The unit actually requested over the wire, addressed by its offset
/// within the owning piece.
#[derive(Debug, Clone)]
pub struct Block {
    offset: u32,
    length: u32,
    data: Option<Bytes>,
    pending: Option<Pending>,
}

impl Block {
    fn new(offset: u32, length: u32) -> Self {
        Self {
            offset,
            length,
            data: None,
            pending: None,
        }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Length the payload must have: 16384, or less for a trailing block.
    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    pub fn is_filled(&self) -> bool {
        self.data.is_some()
    }

    pub fn pending(&self) -> Option<Pending> {
        self.pending
    }
}

/// Result of offering a payload to a piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The payload filled an empty block.
    Stored,
    /// The block already holds this exact payload; nothing changed.
    Duplicate,
    /// The block already holds a different payload; the new one was dropped.
    Conflict,
    /// No block starts at this offset.
    UnknownOffset,
    /// The payload length differs from the block length.
    BadLength { expected: u32, actual: u32 },
    /// The piece was already verified.
    AlreadyComplete,
}

/// Result of checking a piece against its expected digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// At least one block is still empty.
    Incomplete,
    /// Digest matched; the piece bytes in block order.
    Complete(Bytes),
    /// Every block was filled but the digest did not match. The blocks have
    /// been emptied so they get requested again.
    Mismatch,
}

/// A fixed-size, independently verified chunk of the transfer.
#[derive(Debug, Clone)]
pub struct Piece {
    index: u32,
    hash: [u8; 20],
    length: u32,
    blocks: Vec<Block>,
    complete: bool,
}

impl Piece {
    pub fn new(index: u32, hash: [u8; 20], length: u32) -> Self {
        let blocks = (0..block_count(length as u64))
            .map(|i| Block::new(i * crate::constants::BLOCK_SIZE, block_length(length as u64, i)))
            .collect();

        Self {
            index,
            hash,
            length,
            blocks,
            complete: false,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn hash(&self) -> &[u8; 20] {
        &self.hash
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Stores `data` in the block at `offset`. Each block is written at most
    /// once; re-offering the same bytes is a no-op.
    pub fn place(&mut self, offset: u32, data: Bytes) -> Placement {
        if self.complete {
            return Placement::AlreadyComplete;
        }

        let Some(block) = self.blocks.iter_mut().find(|b| b.offset == offset) else {
            return Placement::UnknownOffset;
        };

        if data.len() != block.length as usize {
            return Placement::BadLength {
                expected: block.length,
                actual: data.len() as u32,
            };
        }

        match &block.data {
            Some(existing) if *existing == data => Placement::Duplicate,
            Some(_) => Placement::Conflict,
            None => {
                block.data = Some(data);
                block.pending = None;
                Placement::Stored
            }
        }
    }

    /// Hashes the concatenated blocks in offset order and compares against
    /// the expected digest. On a match the piece becomes complete, which
    /// happens at most once, and the block buffers are released.
    pub fn verify(&mut self) -> Verification {
        if self.complete || self.blocks.iter().any(|b| b.data.is_none()) {
            return Verification::Incomplete;
        }

        let mut buf = BytesMut::with_capacity(self.length as usize);
        let mut hasher = Sha1::new();
        for data in self.blocks.iter().filter_map(|b| b.data.as_ref()) {
            hasher.update(data);
            buf.extend_from_slice(data);
        }
        let digest: [u8; 20] = hasher.finalize().into();

        if digest == self.hash {
            self.complete = true;
            for block in &mut self.blocks {
                block.data = None;
                block.pending = None;
            }
            Verification::Complete(buf.freeze())
        } else {
            self.reset();
            Verification::Mismatch
        }
    }

    /// Empties every block and clears completion.
    pub fn reset(&mut self) {
        self.complete = false;
        for block in &mut self.blocks {
            block.data = None;
            block.pending = None;
        }
    }

    /// The first block with no payload and no request in flight.
    pub fn next_request(&self) -> Option<BlockRequest> {
        if self.complete {
            return None;
        }
        self.blocks
            .iter()
            .find(|b| b.data.is_none() && b.pending.is_none())
            .map(|b| BlockRequest::new(self.index, b.offset, b.length))
    }

    pub fn mark_requested(&mut self, offset: u32, peer: PeerSlot, now: Instant) -> bool {
        match self.blocks.iter_mut().find(|b| b.offset == offset) {
            Some(block) if block.data.is_none() => {
                block.pending = Some(Pending { peer, since: now });
                true
            }
            _ => false,
        }
    }

    /// Forgets the in-flight request for the block at `offset`.
    pub fn release(&mut self, offset: u32) {
        if let Some(block) = self.blocks.iter_mut().find(|b| b.offset == offset) {
            block.pending = None;
        }
    }

    /// Forgets every in-flight request sent to `peer`.
    pub fn release_peer(&mut self, peer: PeerSlot) -> usize {
        self.release_where(|p| p.peer == peer)
    }

    /// Forgets requests older than `timeout`.
    pub fn release_expired(&mut self, now: Instant, timeout: Duration) -> usize {
        self.release_where(|p| now.saturating_duration_since(p.since) >= timeout)
    }

    fn release_where(&mut self, pred: impl Fn(&Pending) -> bool) -> usize {
        let mut released = 0;
        for block in &mut self.blocks {
            if block.pending.as_ref().is_some_and(&pred) {
                block.pending = None;
                released += 1;
            }
        }
        released
    }

    /// Requests in flight, per peer.
    pub fn pending(&self) -> impl Iterator<Item = PeerSlot> + '_ {
        self.blocks.iter().filter_map(|b| b.pending.map(|p| p.peer))
    }
}
