use super::error::SessionError;
use super::event::{InboundPeer, PeerCommand, SessionEvent};
use super::worker::{self, WorkerContext};
use crate::config::ClientConfig;
use crate::constants::{CHANNEL_CAPACITY, TRACKER_ANNOUNCE_INTERVAL, TRACKER_MIN_INTERVAL};
use crate::metainfo::{InfoHash, Metainfo};
use crate::peer::{PeerId, UploadSlots};
use crate::scheduler::Scheduler;
use crate::storage::ByteSink;
use crate::swarm::{PeerSlot, Swarm};
use crate::tracker::{AnnounceRequest, TrackerClient, TrackerEvent};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

/// State every worker of a session reads.
pub(crate) struct Shared {
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
    pub swarm: Swarm,
    pub sink: Arc<dyn ByteSink>,
    pub config: ClientConfig,
}

/// Transfer totals when a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub downloaded: u64,
    pub uploaded: u64,
    pub left: u64,
    pub complete: bool,
}

/// Cheap, cloneable access to a running [`Session`]: stop it, or hand it an
/// inbound connection.
#[derive(Clone)]
pub struct SessionHandle {
    info_hash: InfoHash,
    inbound: mpsc::Sender<InboundPeer>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SessionHandle {
    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    /// Asks the session to close every connection and return.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// True once the session has been dropped.
    pub fn is_closed(&self) -> bool {
        self.inbound.is_closed()
    }

    /// Hands over an inbound connection. Returns false if the session is
    /// gone or its queue is full.
    pub(crate) fn offer(&self, peer: InboundPeer) -> bool {
        self.inbound.try_send(peer).is_ok()
    }
}

/// One transfer: the swarm, its trackers and the workers for its peer
/// connections.
///
/// A session does nothing until [`run`](Session::run) is awaited. `run`
/// announces to the trackers, dials candidate peers, schedules block
/// requests and returns once every piece is verified and written, or when
/// [`SessionHandle::shutdown`] is called.
///
/// ```no_run
/// use swarmer::config::ClientConfig;
/// use swarmer::peer::PeerId;
/// use swarmer::session::Session;
/// use swarmer::storage::FileSink;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let data = std::fs::read("example.torrent")?;
/// let metainfo = swarmer::metainfo::Metainfo::from_bytes(&data)?;
/// let sink = FileSink::in_dir("downloads", &metainfo.info.name, metainfo.info.total_length).await?;
///
/// let session = Session::new(&metainfo, PeerId::generate(), Arc::new(sink), ClientConfig::default());
/// let stats = session.run().await?;
/// assert!(stats.complete);
/// # Ok(())
/// # }
/// ```
pub struct Session {
    shared: Arc<Shared>,
    trackers: Arc<Mutex<TrackerClient>>,
    has_trackers: bool,
    scheduler: Scheduler,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,
    inbound_tx: mpsc::Sender<InboundPeer>,
    inbound_rx: mpsc::Receiver<InboundPeer>,
    shutdown: Arc<watch::Sender<bool>>,
    workers: JoinSet<()>,
    commands: HashMap<PeerSlot, mpsc::Sender<PeerCommand>>,
    candidates: VecDeque<SocketAddr>,
    upload_slots: UploadSlots<PeerSlot>,
    /// Interested peers waiting for an upload slot, oldest first.
    waiting: VecDeque<PeerSlot>,
    next_announce: Instant,
    announcing: bool,
}

impl Session {
    pub fn new(
        metainfo: &Metainfo,
        peer_id: PeerId,
        sink: Arc<dyn ByteSink>,
        config: ClientConfig,
    ) -> Self {
        let trackers = TrackerClient::new(metainfo.trackers());
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (shutdown, _) = watch::channel(false);

        Self {
            has_trackers: !trackers.is_empty(),
            trackers: Arc::new(Mutex::new(trackers)),
            scheduler: Scheduler::new(config.max_requests_per_peer),
            upload_slots: UploadSlots::new(config.upload_slots),
            shared: Arc::new(Shared {
                info_hash: metainfo.info_hash,
                peer_id,
                swarm: Swarm::new(&metainfo.info),
                sink,
                config,
            }),
            events_tx,
            events_rx,
            inbound_tx,
            inbound_rx,
            shutdown: Arc::new(shutdown),
            workers: JoinSet::new(),
            commands: HashMap::new(),
            candidates: VecDeque::new(),
            waiting: VecDeque::new(),
            next_announce: Instant::now(),
            announcing: false,
        }
    }

    /// Parses a bencoded descriptor and builds a session for it.
    pub fn from_descriptor(
        data: &[u8],
        peer_id: PeerId,
        sink: Arc<dyn ByteSink>,
        config: ClientConfig,
    ) -> Result<Self, SessionError> {
        let metainfo = Metainfo::from_bytes(data)?;
        Ok(Self::new(&metainfo, peer_id, sink, config))
    }

    pub fn info_hash(&self) -> InfoHash {
        self.shared.info_hash
    }

    pub fn swarm(&self) -> &Swarm {
        &self.shared.swarm
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            info_hash: self.shared.info_hash,
            inbound: self.inbound_tx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Queues peer addresses to dial, on top of whatever the trackers
    /// return. Known addresses are skipped.
    pub fn add_peers<I: IntoIterator<Item = SocketAddr>>(&mut self, addrs: I) {
        for addr in addrs {
            if !self.candidates.contains(&addr) && !self.shared.swarm.contains_addr(&addr) {
                self.candidates.push_back(addr);
            }
        }
    }

    /// Drives the transfer until every piece is complete or the session is
    /// shut down, then closes all connections and tells the trackers.
    pub async fn run(mut self) -> Result<SessionStats, SessionError> {
        let info_hash = self.shared.info_hash;
        let mut stop = self.shutdown.subscribe();
        tracing::info!(
            %info_hash,
            pieces = self.shared.swarm.piece_count(),
            length = self.shared.swarm.total_length(),
            "session started"
        );

        if self.has_trackers {
            self.spawn_announce(TrackerEvent::Started);
        } else {
            tracing::debug!(%info_hash, "no usable trackers, relying on added peers");
        }
        self.fill_connections();

        let mut tick = tokio::time::interval(self.shared.config.scheduler_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.shared.swarm.is_complete() && !*stop.borrow() {
            tokio::select! {
                _ = stop.changed() => {}
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                Some(inbound) = self.inbound_rx.recv() => self.admit(inbound),
                Some(joined) = self.workers.join_next(), if !self.workers.is_empty() => {
                    if let Err(e) = joined {
                        tracing::warn!(%info_hash, error = %e, "session task failed");
                    }
                }
                _ = tick.tick() => self.on_tick(),
            }
        }

        let complete = self.shared.swarm.is_complete();
        if complete {
            tracing::info!(
                %info_hash,
                downloaded = self.shared.swarm.downloaded(),
                "download complete"
            );
        } else {
            tracing::info!(%info_hash, left = self.shared.swarm.left(), "session stopping");
        }

        self.close_workers().await;

        if self.has_trackers {
            if complete {
                self.announce(TrackerEvent::Completed).await;
            }
            self.announce(TrackerEvent::Stopped).await;
        }

        let swarm = &self.shared.swarm;
        Ok(SessionStats {
            downloaded: swarm.downloaded(),
            uploaded: swarm.uploaded(),
            left: swarm.left(),
            complete,
        })
    }

    pub(super) fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Updated => self.schedule(),
            SessionEvent::Interest { slot, interested } => self.on_interest(slot, interested),
            SessionEvent::PieceCompleted { index } => {
                for (slot, tx) in &self.commands {
                    if tx.try_send(PeerCommand::Have(index)).is_err() {
                        tracing::debug!(%slot, piece = index, "worker queue unavailable, have not sent");
                    }
                }
                tracing::info!(
                    info_hash = %self.shared.info_hash,
                    piece = index,
                    left = self.shared.swarm.left(),
                    "piece verified"
                );
                self.schedule();
            }
            SessionEvent::Closed { slot } => {
                self.commands.remove(&slot);
                self.waiting.retain(|&s| s != slot);
                if self.upload_slots.release(slot) {
                    self.promote_waiting();
                }
                self.fill_connections();
                self.schedule();
            }
            SessionEvent::Announced(result) => {
                self.announcing = false;
                match result {
                    Ok(response) => {
                        let interval = Duration::from_secs(response.interval.into())
                            .max(TRACKER_MIN_INTERVAL);
                        self.next_announce = Instant::now() + interval;
                        self.add_peers(response.peers);
                        self.fill_connections();
                    }
                    Err(_) => {
                        self.next_announce = Instant::now() + TRACKER_MIN_INTERVAL;
                    }
                }
            }
        }
    }

    fn on_tick(&mut self) {
        let expired = self
            .shared
            .swarm
            .release_expired(self.shared.config.request_timeout);
        if expired > 0 {
            tracing::debug!(info_hash = %self.shared.info_hash, expired, "released timed out requests");
        }

        let scarce = self.candidates.is_empty()
            && self.shared.swarm.peer_count() < self.shared.config.max_peers;
        if self.has_trackers
            && !self.announcing
            && scarce
            && Instant::now() >= self.next_announce
        {
            self.spawn_announce(TrackerEvent::None);
        }

        self.fill_connections();
        self.schedule();
    }

    /// Sends one decision step's requests. A request whose worker cannot
    /// take it goes straight back to the pool.
    fn schedule(&mut self) {
        for assignment in self.scheduler.plan(&self.shared.swarm) {
            if !self.command(assignment.peer, PeerCommand::Request(assignment.request)) {
                self.shared.swarm.release(&assignment.request);
            }
        }
    }

    fn on_interest(&mut self, slot: PeerSlot, interested: bool) {
        if interested {
            if self.upload_slots.acquire(slot) {
                if !self.unchoke(slot) {
                    self.promote_waiting();
                }
            } else if !self.waiting.contains(&slot) {
                self.waiting.push_back(slot);
            }
        } else {
            self.waiting.retain(|&s| s != slot);
            if self.upload_slots.release(slot) {
                self.command(slot, PeerCommand::Choke);
                self.promote_waiting();
            }
        }
    }

    fn promote_waiting(&mut self) {
        while let Some(slot) = self.waiting.pop_front() {
            if self.commands.contains_key(&slot)
                && self.upload_slots.acquire(slot)
                && self.unchoke(slot)
            {
                break;
            }
        }
    }

    /// Tells a slot holder it may download. If the worker cannot take the
    /// command the slot is given back.
    fn unchoke(&mut self, slot: PeerSlot) -> bool {
        if self.command(slot, PeerCommand::Unchoke) {
            return true;
        }
        tracing::debug!(%slot, "worker queue unavailable, upload slot released");
        self.upload_slots.release(slot);
        false
    }

    fn command(&self, slot: PeerSlot, command: PeerCommand) -> bool {
        self.commands
            .get(&slot)
            .is_some_and(|tx| tx.try_send(command).is_ok())
    }

    fn fill_connections(&mut self) {
        while self.shared.swarm.peer_count() < self.shared.config.max_peers {
            let Some(addr) = self.candidates.pop_front() else {
                break;
            };
            if self.shared.swarm.contains_addr(&addr) {
                continue;
            }

            let ctx = self.open_worker(addr);
            tracing::debug!(info_hash = %self.shared.info_hash, peer = %addr, slot = %ctx.slot, "dialing peer");
            self.workers.spawn(worker::run_outbound(ctx, addr));
        }
    }

    fn admit(&mut self, inbound: InboundPeer) {
        let addr = inbound.addr;
        if self.shared.swarm.peer_count() >= self.shared.config.max_peers {
            tracing::debug!(peer = %addr, "peer limit reached, dropping inbound connection");
            return;
        }
        if self.shared.swarm.contains_addr(&addr) {
            tracing::debug!(peer = %addr, "already connected, dropping inbound connection");
            return;
        }

        let ctx = self.open_worker(addr);
        tracing::debug!(info_hash = %self.shared.info_hash, peer = %addr, slot = %ctx.slot, "accepting inbound peer");
        self.workers.spawn(worker::run_inbound(ctx, inbound));
    }

    pub(super) fn open_worker(&mut self, addr: SocketAddr) -> WorkerContext {
        let slot = self.shared.swarm.add_peer(addr);
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.commands.insert(slot, tx);

        WorkerContext {
            slot,
            shared: self.shared.clone(),
            commands: rx,
            events: self.events_tx.clone(),
            shutdown: self.shutdown.subscribe(),
        }
    }

    /// Signals every worker and waits for all of them. Events keep being
    /// drained so no worker blocks on a full queue.
    async fn close_workers(&mut self) {
        self.shutdown.send_replace(true);
        self.commands.clear();

        loop {
            tokio::select! {
                joined = self.workers.join_next() => match joined {
                    Some(Err(e)) => tracing::warn!(info_hash = %self.shared.info_hash, error = %e, "session task failed"),
                    Some(Ok(())) => {}
                    None => break,
                },
                Some(_) = self.events_rx.recv() => {}
            }
        }
    }

    fn announce_request(&self, event: TrackerEvent) -> AnnounceRequest {
        let swarm = &self.shared.swarm;
        AnnounceRequest {
            info_hash: *self.shared.info_hash.as_bytes(),
            peer_id: *self.shared.peer_id.as_bytes(),
            port: self.shared.config.listen_port,
            uploaded: swarm.uploaded(),
            downloaded: swarm.downloaded(),
            left: swarm.left(),
            event,
            num_want: None,
        }
    }

    /// Announces in the background; the result comes back as an event.
    fn spawn_announce(&mut self, event: TrackerEvent) {
        let request = self.announce_request(event);
        let trackers = self.trackers.clone();
        let events = self.events_tx.clone();

        self.announcing = true;
        self.next_announce = Instant::now() + TRACKER_ANNOUNCE_INTERVAL;
        self.workers.spawn(async move {
            let result = trackers.lock().await.announce_any(&request).await;
            let _ = events.send(SessionEvent::Announced(result)).await;
        });
    }

    async fn announce(&self, event: TrackerEvent) {
        let request = self.announce_request(event);
        if let Err(e) = self.trackers.lock().await.announce_any(&request).await {
            tracing::warn!(
                info_hash = %self.shared.info_hash,
                event = event.as_str(),
                error = %e,
                "final announce failed"
            );
        }
    }
}
