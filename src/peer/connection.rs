use super::choking::ChokingState;
use super::error::PeerError;
use super::message::{Handshake, Message};
use super::peer_id::PeerId;
use super::transport::PeerTransport;
use crate::config::ClientConfig;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Lifecycle of a peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// TCP connect in progress.
    Connecting,
    /// Connected, exchanging the 68-byte handshake.
    Handshaking,
    /// Handshake verified; messages flow.
    Active,
    /// Torn down. Terminal.
    Closed,
}

/// An established connection to one remote peer.
///
/// Tracks both directions of choke/interest and when traffic last moved.
/// A `bitfield` is only accepted as the first message after the handshake;
/// anywhere later it is a protocol violation.
///
/// # Examples
///
/// ```no_run
/// use swarmer::config::ClientConfig;
/// use swarmer::peer::{Message, PeerConnection, PeerId};
/// use std::net::SocketAddr;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let addr: SocketAddr = "192.168.1.100:6881".parse()?;
/// let config = ClientConfig::default();
///
/// let mut conn = PeerConnection::connect(addr, [0u8; 20], PeerId::generate(), &config).await?;
/// conn.send(Message::Interested).await?;
/// # Ok(())
/// # }
/// ```
pub struct PeerConnection {
    pub addr: SocketAddr,
    /// Remote peer id from its handshake.
    pub peer_id: PeerId,
    pub state: ConnectionState,
    pub choking: ChokingState,
    pub last_received: Instant,
    pub last_sent: Instant,
    messages_received: u64,
    transport: PeerTransport,
}

impl PeerConnection {
    /// Dials `addr`, sends our handshake and waits for the remote's.
    /// The remote must answer with the same info hash.
    pub async fn connect(
        addr: SocketAddr,
        info_hash: [u8; 20],
        our_peer_id: PeerId,
        config: &ClientConfig,
    ) -> Result<Self, PeerError> {
        tracing::trace!(%addr, state = ?ConnectionState::Connecting, "dialing peer");
        let stream = timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| PeerError::Timeout)??;
        let mut transport =
            PeerTransport::with_timeouts(stream, config.handshake_timeout, config.write_timeout);

        tracing::trace!(%addr, state = ?ConnectionState::Handshaking, "sending handshake");
        transport
            .send_handshake(&Handshake::new(info_hash, *our_peer_id.as_bytes()))
            .await?;
        let theirs = transport.receive_handshake().await?;

        if theirs.info_hash != info_hash {
            return Err(PeerError::InfoHashMismatch);
        }

        transport.set_read_timeout(config.read_timeout);
        Ok(Self::established(addr, PeerId::from(theirs.peer_id), transport))
    }

    /// Completes an inbound connection whose handshake has already been read
    /// and routed to this session: replies with our own handshake.
    pub async fn accept(
        mut transport: PeerTransport,
        theirs: Handshake,
        our_peer_id: PeerId,
        config: &ClientConfig,
    ) -> Result<Self, PeerError> {
        let addr = transport.peer_addr()?;

        transport
            .send_handshake(&Handshake::new(theirs.info_hash, *our_peer_id.as_bytes()))
            .await?;

        transport.set_read_timeout(config.read_timeout);
        Ok(Self::established(addr, PeerId::from(theirs.peer_id), transport))
    }

    fn established(addr: SocketAddr, peer_id: PeerId, transport: PeerTransport) -> Self {
        let now = Instant::now();
        Self {
            addr,
            peer_id,
            state: ConnectionState::Active,
            choking: ChokingState::default(),
            last_received: now,
            last_sent: now,
            messages_received: 0,
            transport,
        }
    }

    /// Sends one message and records our side of any choke/interest change.
    pub async fn send(&mut self, message: Message) -> Result<(), PeerError> {
        if self.state != ConnectionState::Active {
            return Err(PeerError::ConnectionClosed);
        }

        self.transport.send(&message).await?;
        self.last_sent = Instant::now();

        match message {
            Message::Choke => self.choking.am_choking = true,
            Message::Unchoke => self.choking.am_choking = false,
            Message::Interested => self.choking.am_interested = true,
            Message::NotInterested => self.choking.am_interested = false,
            _ => {}
        }
        Ok(())
    }

    /// Reads the next message and records the remote's side of any
    /// choke/interest change. Cancel-safe.
    pub async fn receive(&mut self) -> Result<Message, PeerError> {
        if self.state != ConnectionState::Active {
            return Err(PeerError::ConnectionClosed);
        }

        let message = self.transport.receive().await?;
        self.last_received = Instant::now();

        match &message {
            Message::KeepAlive => return Ok(message),
            Message::Bitfield(_) if self.messages_received > 0 => {
                return Err(PeerError::Protocol(
                    "bitfield after the first message".into(),
                ));
            }
            Message::Choke => self.choking.peer_choking = true,
            Message::Unchoke => self.choking.peer_choking = false,
            Message::Interested => self.choking.peer_interested = true,
            Message::NotInterested => self.choking.peer_interested = false,
            _ => {}
        }
        self.messages_received += 1;

        Ok(message)
    }

    pub async fn close(&mut self) {
        if self.state != ConnectionState::Closed {
            self.state = ConnectionState::Closed;
            self.transport.shutdown().await;
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Active
    }
}
