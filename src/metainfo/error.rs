use thiserror::Error;

use crate::bencode::BencodeError;

/// Errors that can occur when parsing a torrent descriptor.
#[derive(Debug, Error)]
pub enum MetainfoError {
    /// The descriptor is not valid bencode.
    #[error("bencode error: {0}")]
    Bencode(#[from] BencodeError),

    /// A required field is missing.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field has an invalid value or type.
    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    /// The digest list does not match the total length: every piece but the
    /// last is `piece length` bytes.
    #[error("descriptor has {actual} piece digests, length needs {expected}")]
    PieceCountMismatch { expected: u64, actual: u64 },

    /// An info hash was not 20 bytes (or 40 hex characters).
    #[error("invalid info hash length")]
    InvalidInfoHashLength,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
