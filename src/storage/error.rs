use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A read or write reaching past the end of the sink.
    #[error("range out of bounds: offset {offset}, length {length}, size {size}")]
    OutOfBounds { offset: u64, length: u64, size: u64 },

    #[error("path traversal detected in file path: {0}")]
    PathTraversal(String),
}
