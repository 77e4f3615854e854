use crate::metainfo::InfoHash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metainfo error: {0}")]
    Metainfo(#[from] crate::metainfo::MetainfoError),

    /// A live session already serves this info hash.
    #[error("session already registered: {0}")]
    DuplicateSession(InfoHash),
}
