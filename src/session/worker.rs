use super::event::{InboundPeer, PeerCommand, SessionEvent};
use super::driver::Shared;
use crate::constants::{MAX_QUEUED_UPLOADS, MAX_REQUEST_LENGTH, PEER_TICK_INTERVAL};
use crate::peer::{Bitfield, BlockRequest, ConnectionState, Message, PeerConnection, PeerError};
use crate::swarm::{Assembly, PeerSlot, Placement};
use bytes::Bytes;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// Channels and shared state handed to one peer task.
pub(crate) struct WorkerContext {
    pub slot: PeerSlot,
    pub shared: Arc<Shared>,
    pub commands: mpsc::Receiver<PeerCommand>,
    pub events: mpsc::Sender<SessionEvent>,
    pub shutdown: watch::Receiver<bool>,
}

impl WorkerContext {
    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event).await;
    }

    /// Leaves the swarm: the peer's outstanding requests go back to the
    /// pool and the session forgets the slot.
    async fn finish(self) {
        self.shared.swarm.remove_peer(self.slot);
        let slot = self.slot;
        self.emit(SessionEvent::Closed { slot }).await;
    }
}

/// Dials `addr` and runs the connection until it ends.
pub(crate) async fn run_outbound(mut ctx: WorkerContext, addr: SocketAddr) {
    let shared = ctx.shared.clone();
    let connect = PeerConnection::connect(
        addr,
        *shared.info_hash.as_bytes(),
        shared.peer_id,
        &shared.config,
    );

    let result = tokio::select! {
        result = connect => result,
        _ = stopped(&mut ctx.shutdown) => {
            ctx.finish().await;
            return;
        }
    };

    match result {
        Ok(conn) => drive(ctx, conn).await,
        Err(e) => {
            tracing::debug!(peer = %addr, error = %e, "peer connect failed");
            ctx.finish().await;
        }
    }
}

/// Answers an inbound handshake and runs the connection until it ends.
pub(crate) async fn run_inbound(ctx: WorkerContext, inbound: InboundPeer) {
    let shared = ctx.shared.clone();
    ctx.shared
        .swarm
        .update_peer(ctx.slot, |v| v.state = ConnectionState::Handshaking);

    match PeerConnection::accept(
        inbound.transport,
        inbound.handshake,
        shared.peer_id,
        &shared.config,
    )
    .await
    {
        Ok(conn) => drive(ctx, conn).await,
        Err(e) => {
            tracing::debug!(peer = %inbound.addr, error = %e, "inbound handshake failed");
            ctx.finish().await;
        }
    }
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn drive(ctx: WorkerContext, conn: PeerConnection) {
    let addr = conn.addr;
    let mut worker = PeerWorker {
        conn,
        ctx,
        uploads: VecDeque::new(),
    };

    match worker.run().await {
        Ok(()) => tracing::trace!(peer = %addr, "peer worker stopped"),
        Err(e) if e.is_transport() => tracing::debug!(peer = %addr, error = %e, "peer disconnected"),
        Err(e) => tracing::warn!(peer = %addr, error = %e, "dropping peer after protocol violation"),
    }

    worker.conn.close().await;
    worker.ctx.finish().await;
}

/// Owns one active connection: reads its messages, executes session
/// commands and serves queued uploads.
struct PeerWorker {
    conn: PeerConnection,
    ctx: WorkerContext,
    uploads: VecDeque<BlockRequest>,
}

impl PeerWorker {
    async fn run(&mut self) -> Result<(), PeerError> {
        let swarm = &self.ctx.shared.swarm;
        let peer_id = self.conn.peer_id;
        swarm.update_peer(self.ctx.slot, |v| {
            v.state = ConnectionState::Active;
            v.peer_id = Some(peer_id);
        });
        tracing::debug!(peer = %self.conn.addr, client = ?peer_id, "peer connected");

        let have = swarm.local_bitfield();
        if !have.is_empty() {
            self.conn.send(Message::Bitfield(have.to_bytes())).await?;
        }

        let mut tick = tokio::time::interval(PEER_TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.ctx.stopping() {
            // buffered messages go first so a cancel reaches the upload
            // queue before the block it names is served
            tokio::select! {
                biased;
                changed = self.ctx.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                command = self.ctx.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await?,
                    None => break,
                },
                message = self.conn.receive() => self.handle_message(message?).await?,
                _ = tick.tick() => self.housekeeping().await?,
                _ = std::future::ready(()), if !self.uploads.is_empty() => self.serve_upload().await?,
            }
        }

        Ok(())
    }

    async fn handle_command(&mut self, command: PeerCommand) -> Result<(), PeerError> {
        match command {
            PeerCommand::Request(request) => {
                // the remote may have choked us since the plan was made
                if !self.conn.choking.can_request() {
                    self.ctx.shared.swarm.release(&request);
                    return Ok(());
                }
                self.conn.send(Message::Request(request)).await?;
            }
            PeerCommand::Have(piece) => {
                self.conn.send(Message::Have { piece }).await?;
                self.update_interest().await?;
            }
            PeerCommand::Choke => {
                self.uploads.clear();
                self.conn.send(Message::Choke).await?;
                self.sync_choking();
            }
            PeerCommand::Unchoke => {
                self.conn.send(Message::Unchoke).await?;
                self.sync_choking();
            }
        }
        Ok(())
    }

    async fn handle_message(&mut self, message: Message) -> Result<(), PeerError> {
        let slot = self.ctx.slot;
        let swarm = &self.ctx.shared.swarm;

        match message {
            Message::KeepAlive => {}
            Message::Choke => {
                let released = swarm.release_peer(slot);
                tracing::trace!(peer = %self.conn.addr, released, "choked by peer");
                self.sync_choking();
                self.ctx.emit(SessionEvent::Updated).await;
            }
            Message::Unchoke => {
                self.sync_choking();
                self.ctx.emit(SessionEvent::Updated).await;
            }
            Message::Interested | Message::NotInterested => {
                self.sync_choking();
                let interested = self.conn.choking.peer_interested;
                self.ctx
                    .emit(SessionEvent::Interest { slot, interested })
                    .await;
            }
            Message::Have { piece } => {
                if piece as usize >= swarm.piece_count() {
                    return Err(PeerError::Protocol(format!("have for piece {}", piece)));
                }
                swarm.update_peer(slot, |v| v.bitfield.set(piece as usize));
                self.update_interest().await?;
                self.ctx.emit(SessionEvent::Updated).await;
            }
            Message::Bitfield(payload) => {
                let bitfield = Bitfield::from_payload(&payload, swarm.piece_count())?;
                tracing::trace!(peer = %self.conn.addr, pieces = bitfield.count(), "peer bitfield");
                swarm.update_peer(slot, |v| v.bitfield = bitfield);
                self.update_interest().await?;
                self.ctx.emit(SessionEvent::Updated).await;
            }
            Message::Request(request) => self.queue_upload(request)?,
            Message::Piece { index, begin, data } => self.receive_block(index, begin, data).await,
            Message::Cancel(request) => self.uploads.retain(|r| *r != request),
        }
        Ok(())
    }

    async fn receive_block(&mut self, index: u32, begin: u32, data: Bytes) {
        let slot = self.ctx.slot;
        let shared = self.ctx.shared.clone();
        let len = data.len() as u64;

        match shared.swarm.assemble(index, begin, data) {
            Assembly::Stored => {
                shared.swarm.update_peer(slot, |v| v.downloaded += len);
            }
            Assembly::Completed {
                index,
                offset,
                data,
            } => {
                shared.swarm.update_peer(slot, |v| v.downloaded += len);
                match shared.sink.write_at(offset, data).await {
                    Ok(()) => {
                        if shared.swarm.mark_have(index) {
                            tracing::debug!(piece = index, peer = %self.conn.addr, "piece complete");
                            self.ctx.emit(SessionEvent::PieceCompleted { index }).await;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(piece = index, error = %e, "writing piece failed, fetching it again");
                        shared.swarm.reset_piece(index);
                    }
                }
            }
            Assembly::HashMismatch { index } => {
                tracing::warn!(piece = index, peer = %self.conn.addr, "piece failed hash check");
            }
            Assembly::Rejected(Placement::Duplicate | Placement::AlreadyComplete) => {
                tracing::trace!(piece = index, begin, "ignoring duplicate block");
            }
            Assembly::Rejected(placement) => {
                tracing::debug!(piece = index, begin, ?placement, peer = %self.conn.addr, "dropping piece message");
            }
            Assembly::UnknownPiece => {
                tracing::debug!(piece = index, peer = %self.conn.addr, "dropping piece message for unknown piece");
            }
        }

        self.ctx.emit(SessionEvent::Updated).await;
    }

    /// Validates an inbound request and queues it. Requests that arrive
    /// while we choke the peer are ignored.
    fn queue_upload(&mut self, request: BlockRequest) -> Result<(), PeerError> {
        if self.conn.choking.am_choking {
            tracing::trace!(peer = %self.conn.addr, ?request, "ignoring request while choking");
            return Ok(());
        }

        let swarm = &self.ctx.shared.swarm;
        let size = swarm
            .piece_size(request.piece)
            .ok_or_else(|| PeerError::Protocol(format!("request for piece {}", request.piece)))?;

        if !swarm.has_piece(request.piece) {
            return Err(PeerError::Protocol(format!(
                "request for missing piece {}",
                request.piece
            )));
        }
        if request.length == 0 || request.length > MAX_REQUEST_LENGTH || request.end() > size as u64 {
            return Err(PeerError::Protocol(format!("request out of range: {:?}", request)));
        }

        if self.uploads.len() < MAX_QUEUED_UPLOADS && !self.uploads.contains(&request) {
            self.uploads.push_back(request);
        }
        Ok(())
    }

    async fn serve_upload(&mut self) -> Result<(), PeerError> {
        let Some(request) = self.uploads.pop_front() else {
            return Ok(());
        };

        let shared = self.ctx.shared.clone();
        let offset = shared.swarm.piece_offset(request.piece) + request.offset as u64;
        let data = match shared.sink.read_at(offset, request.length as usize).await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(piece = request.piece, error = %e, "reading block for upload failed");
                return Ok(());
            }
        };

        let len = data.len() as u64;
        self.conn
            .send(Message::Piece {
                index: request.piece,
                begin: request.offset,
                data,
            })
            .await?;

        shared.swarm.add_uploaded(len);
        shared.swarm.update_peer(self.ctx.slot, |v| v.uploaded += len);
        Ok(())
    }

    /// Sends `interested`/`not interested` when the remote's pieces stop or
    /// start covering something we lack.
    async fn update_interest(&mut self) -> Result<(), PeerError> {
        let swarm = &self.ctx.shared.swarm;
        let ours = swarm.local_bitfield();
        let wanted = swarm
            .peer(self.ctx.slot, |v| v.bitfield.has_missing_from(&ours))
            .unwrap_or(false);

        if wanted != self.conn.choking.am_interested {
            let message = if wanted {
                Message::Interested
            } else {
                Message::NotInterested
            };
            self.conn.send(message).await?;
            self.sync_choking();
        }
        Ok(())
    }

    async fn housekeeping(&mut self) -> Result<(), PeerError> {
        let config = &self.ctx.shared.config;
        if self.conn.last_received.elapsed() >= config.read_timeout {
            return Err(PeerError::Timeout);
        }
        if self.conn.last_sent.elapsed() >= config.keepalive_interval {
            self.conn.send(Message::KeepAlive).await?;
        }
        Ok(())
    }

    fn sync_choking(&self) {
        let choking = self.conn.choking;
        self.ctx
            .shared
            .swarm
            .update_peer(self.ctx.slot, |v| v.choking = choking);
    }
}
