use super::driver::{Session, SessionHandle};
use super::error::SessionError;
use super::event::InboundPeer;
use crate::config::ClientConfig;
use crate::metainfo::{InfoHash, Metainfo};
use crate::peer::{PeerId, PeerTransport};
use crate::storage::ByteSink;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

/// Registry of sessions sharing one peer id and one listening port.
///
/// Inbound connections are routed by the info hash in their handshake; a
/// hash with no live session is dropped.
///
/// ```no_run
/// use swarmer::config::ClientConfig;
/// use swarmer::session::Client;
/// use swarmer::storage::MemorySink;
/// use std::sync::Arc;
///
/// # async fn example(metainfo: swarmer::metainfo::Metainfo) -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::new(ClientConfig::default());
/// let listener = client.bind().await?;
/// tokio::spawn(listener.run());
///
/// let session = client.add_session(&metainfo, Arc::new(MemorySink::new()))?;
/// session.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    peer_id: PeerId,
    config: ClientConfig,
    sessions: Arc<DashMap<InfoHash, SessionHandle>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            peer_id: PeerId::generate(),
            config,
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Our peer id, generated once and used by every session.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Creates a session for `metainfo` and registers it for inbound
    /// routing. The caller drives it with [`Session::run`].
    ///
    /// # Errors
    ///
    /// [`SessionError::DuplicateSession`] if a live session already serves
    /// the same info hash.
    pub fn add_session(
        &self,
        metainfo: &Metainfo,
        sink: Arc<dyn ByteSink>,
    ) -> Result<Session, SessionError> {
        let info_hash = metainfo.info_hash;
        let session = Session::new(metainfo, self.peer_id, sink, self.config.clone());

        match self.sessions.entry(info_hash) {
            Entry::Occupied(entry) if !entry.get().is_closed() => {
                return Err(SessionError::DuplicateSession(info_hash));
            }
            Entry::Occupied(mut entry) => {
                entry.insert(session.handle());
            }
            Entry::Vacant(entry) => {
                entry.insert(session.handle());
            }
        }

        tracing::debug!(%info_hash, "session registered");
        Ok(session)
    }

    /// Unregisters a session and signals it to stop.
    pub fn remove_session(&self, info_hash: &InfoHash) -> Option<SessionHandle> {
        let (_, handle) = self.sessions.remove(info_hash)?;
        handle.shutdown();
        Some(handle)
    }

    pub fn session(&self, info_hash: &InfoHash) -> Option<SessionHandle> {
        self.sessions.get(info_hash).map(|h| h.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Binds the listening port for inbound peers on every IPv4 interface.
    pub async fn bind(&self) -> Result<Listener, SessionError> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, self.config.listen_port)).await?;
        tracing::info!(addr = %listener.local_addr()?, "listening for peers");

        Ok(Listener {
            listener,
            sessions: self.sessions.clone(),
            config: self.config.clone(),
        })
    }
}

/// Accepts inbound peer connections and routes each one to its session.
pub struct Listener {
    listener: TcpListener,
    sessions: Arc<DashMap<InfoHash, SessionHandle>>,
    config: ClientConfig,
}

impl Listener {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Runs until the task is dropped; accept errors are logged
    /// and the loop goes on.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    tokio::spawn(route(
                        stream,
                        addr,
                        self.sessions.clone(),
                        self.config.clone(),
                    ));
                }
                Err(e) => tracing::warn!(error = %e, "accept failed"),
            }
        }
    }
}

/// Reads the handshake of one inbound connection and passes it on. The
/// connection is dropped when the handshake is malformed or late, or when
/// no live session matches its info hash.
async fn route(
    stream: TcpStream,
    addr: SocketAddr,
    sessions: Arc<DashMap<InfoHash, SessionHandle>>,
    config: ClientConfig,
) {
    let mut transport =
        PeerTransport::with_timeouts(stream, config.handshake_timeout, config.write_timeout);

    let handshake = match transport.receive_handshake().await {
        Ok(handshake) => handshake,
        Err(e) => {
            tracing::debug!(peer = %addr, error = %e, "inbound handshake failed");
            return;
        }
    };

    let info_hash = InfoHash(handshake.info_hash);
    let handle = sessions.get(&info_hash).map(|h| h.clone());

    match handle {
        Some(handle) if !handle.is_closed() => {
            let peer = InboundPeer {
                addr,
                transport,
                handshake,
            };
            if !handle.offer(peer) {
                tracing::debug!(peer = %addr, %info_hash, "session busy, dropping inbound connection");
            }
        }
        Some(_) => {
            sessions.remove_if(&info_hash, |_, h| h.is_closed());
            tracing::debug!(peer = %addr, %info_hash, "session closed, dropping inbound connection");
        }
        None => {
            tracing::debug!(peer = %addr, %info_hash, "unknown info hash, dropping inbound connection");
        }
    }
}
