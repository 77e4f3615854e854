use super::error::StorageError;
use super::sink::{check_range, ByteSink};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

/// In-memory sink that remembers the offset and length of every write.
#[derive(Debug, Default)]
pub struct MemorySink {
    data: Mutex<Vec<u8>>,
    writes: Mutex<Vec<(u64, usize)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink pre-filled with `data`, e.g. to act as a seeder.
    pub fn with_data(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Mutex::new(data.into()),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// `(offset, length)` of every write so far, in call order.
    pub fn writes(&self) -> Vec<(u64, usize)> {
        self.writes.lock().clone()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

#[async_trait]
impl ByteSink for MemorySink {
    async fn write_at(&self, offset: u64, data: Bytes) -> Result<(), StorageError> {
        let end = offset as usize + data.len();
        {
            let mut buf = self.data.lock();
            if buf.len() < end {
                buf.resize(end, 0);
            }
            buf[offset as usize..end].copy_from_slice(&data);
        }
        self.writes.lock().push((offset, data.len()));
        Ok(())
    }

    async fn read_at(&self, offset: u64, length: usize) -> Result<Bytes, StorageError> {
        let buf = self.data.lock();
        check_range(offset, length as u64, buf.len() as u64)?;
        let start = offset as usize;
        Ok(Bytes::copy_from_slice(&buf[start..start + length]))
    }
}
