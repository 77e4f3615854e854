//! Torrent descriptor handling.
//!
//! A descriptor (`.torrent` file) names the tracker(s), the piece layout and
//! the files of one transfer. The SHA-1 of its bencoded `info` dictionary is
//! the info-hash that identifies the swarm.
//!
//! ```no_run
//! use swarmer::metainfo::Metainfo;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = std::fs::read("example.torrent")?;
//! let torrent = Metainfo::from_bytes(&data)?;
//!
//! println!("{} ({} bytes) {}", torrent.info.name, torrent.info.total_length, torrent.info_hash);
//! for tracker in torrent.trackers() {
//!     println!("tracker: {}", tracker);
//! }
//! # Ok(())
//! # }
//! ```

mod descriptor;
mod error;
mod info_hash;

pub use descriptor::{File, Info, Metainfo};
pub use error::MetainfoError;
pub use info_hash::InfoHash;

#[cfg(test)]
mod tests;
