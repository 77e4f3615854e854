use super::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;

/// Random-access destination for piece data, addressed by absolute offset.
///
/// Implementations must tolerate concurrent calls from many peer workers.
#[async_trait]
pub trait ByteSink: Send + Sync {
    /// Writes `data` starting at `offset`.
    async fn write_at(&self, offset: u64, data: Bytes) -> Result<(), StorageError>;

    /// Reads exactly `length` bytes starting at `offset`.
    async fn read_at(&self, offset: u64, length: usize) -> Result<Bytes, StorageError>;
}

/// Fails unless `offset..offset + length` lies within `size` bytes.
pub(crate) fn check_range(offset: u64, length: u64, size: u64) -> Result<(), StorageError> {
    match offset.checked_add(length) {
        Some(end) if end <= size => Ok(()),
        _ => Err(StorageError::OutOfBounds {
            offset,
            length,
            size,
        }),
    }
}
