use crate::constants::BLOCK_SIZE;

/// A block as addressed on the wire by `request`, `piece` and `cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRequest {
    pub piece: u32,
    pub offset: u32,
    pub length: u32,
}

impl BlockRequest {
    pub fn new(piece: u32, offset: u32, length: u32) -> Self {
        Self {
            piece,
            offset,
            length,
        }
    }

    pub fn end(&self) -> u64 {
        self.offset as u64 + self.length as u64
    }
}

pub fn block_count(piece_length: u64) -> u32 {
    piece_length.div_ceil(BLOCK_SIZE as u64) as u32
}

/// Length of block `block_index` in a piece of `piece_length` bytes.
pub fn block_length(piece_length: u64, block_index: u32) -> u32 {
    let offset = block_index as u64 * BLOCK_SIZE as u64;
    piece_length.saturating_sub(offset).min(BLOCK_SIZE as u64) as u32
}
