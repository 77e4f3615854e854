//! Byte sinks for verified piece data.
//!
//! A session writes each verified piece at `piece_length * index` and reads
//! ranges back to serve uploads. [`FileSink`] backs that with a single
//! preallocated file; [`MemorySink`] keeps everything in memory and records
//! every write.
//!
//! ```no_run
//! use swarmer::storage::{ByteSink, FileSink};
//! use bytes::Bytes;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sink = FileSink::create("downloads/payload.bin", 1 << 20).await?;
//! sink.write_at(0, Bytes::from_static(b"hello")).await?;
//! let back = sink.read_at(0, 5).await?;
//! assert_eq!(&back[..], b"hello");
//! # Ok(())
//! # }
//! ```
//!
//! # Security
//!
//! [`FileSink::in_dir`] rejects names containing `..` or absolute paths.

mod error;
mod file;
mod memory;
mod sink;

pub use error::StorageError;
pub use file::FileSink;
pub use memory::MemorySink;
pub use sink::ByteSink;

#[cfg(test)]
mod tests;
