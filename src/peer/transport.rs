use super::error::PeerError;
use super::message::{Handshake, Message};
use crate::constants::{HANDSHAKE_LEN, MAX_MESSAGE_SIZE, PEER_READ_TIMEOUT, PEER_WRITE_TIMEOUT};
use bytes::{Buf, BytesMut};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Length-prefixed framing over a TCP stream.
///
/// Every read and write carries a deadline; expiry surfaces as
/// [`PeerError::Timeout`]. Partial frames live in `read_buf`, so a
/// `receive` dropped mid-frame (e.g. by `select!`) loses nothing.
pub struct PeerTransport {
    stream: TcpStream,
    read_buf: BytesMut,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl PeerTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self::with_timeouts(stream, PEER_READ_TIMEOUT, PEER_WRITE_TIMEOUT)
    }

    pub fn with_timeouts(stream: TcpStream, read_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(32 * 1024),
            read_timeout,
            write_timeout,
        }
    }

    pub async fn send_handshake(&mut self, handshake: &Handshake) -> Result<(), PeerError> {
        let data = handshake.encode();
        let write_timeout = self.write_timeout;
        deadline(write_timeout, self.stream.write_all(&data)).await
    }

    pub async fn receive_handshake(&mut self) -> Result<Handshake, PeerError> {
        self.fill(HANDSHAKE_LEN).await?;
        let data = self.read_buf.split_to(HANDSHAKE_LEN);
        Handshake::decode(&data)
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), PeerError> {
        let data = message.encode();
        let write_timeout = self.write_timeout;
        deadline(write_timeout, self.stream.write_all(&data)).await
    }

    /// Reads one frame. Cancel-safe.
    pub async fn receive(&mut self) -> Result<Message, PeerError> {
        self.fill(4).await?;

        let length = u32::from_be_bytes([
            self.read_buf[0],
            self.read_buf[1],
            self.read_buf[2],
            self.read_buf[3],
        ]) as usize;

        if length > MAX_MESSAGE_SIZE {
            return Err(PeerError::InvalidMessage(format!(
                "message too large: {}",
                length
            )));
        }

        self.fill(4 + length).await?;

        self.read_buf.advance(4);
        let body = self.read_buf.split_to(length);
        Message::decode(body.freeze())
    }

    /// Reads until at least `len` bytes are buffered.
    async fn fill(&mut self, len: usize) -> Result<(), PeerError> {
        while self.read_buf.len() < len {
            let read_timeout = self.read_timeout;
            let n = deadline(read_timeout, self.stream.read_buf(&mut self.read_buf)).await?;

            if n == 0 {
                return Err(PeerError::ConnectionClosed);
            }
        }
        Ok(())
    }

    pub fn set_read_timeout(&mut self, read_timeout: Duration) {
        self.read_timeout = read_timeout;
    }

    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

async fn deadline<T>(
    limit: Duration,
    op: impl Future<Output = std::io::Result<T>>,
) -> Result<T, PeerError> {
    Ok(timeout(limit, op).await.map_err(|_| PeerError::Timeout)??)
}
