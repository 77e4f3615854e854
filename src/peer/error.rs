use thiserror::Error;

/// Errors that end a peer connection.
///
/// None of these are fatal to the session: the worker that hits one closes
/// its connection and the peer leaves the scheduling pool.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Network I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent a handshake with the wrong length or protocol name.
    #[error("invalid handshake")]
    InvalidHandshake,

    /// The peer's info hash doesn't match ours.
    #[error("info hash mismatch")]
    InfoHashMismatch,

    /// Received a malformed protocol message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Received an unknown message ID.
    #[error("invalid message id: {0}")]
    InvalidMessageId(u8),

    /// The connection was closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// A read or write passed its deadline.
    #[error("timeout")]
    Timeout,

    /// Protocol violation by the peer.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl PeerError {
    /// True for failures of the connection itself rather than of the
    /// peer's behaviour.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            PeerError::Io(_) | PeerError::ConnectionClosed | PeerError::Timeout
        )
    }
}
