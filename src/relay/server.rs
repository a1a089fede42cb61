//! Relay server
//!
//! Accepts one transfer per TCP connection, verifies it against the
//! digest declared at the origin, then either keeps it (final hop) or
//! pushes it to the next node with the local [`FileSender`].

use crate::config::NodeConfig;
use crate::integrity::{IntegrityError, IntegrityVerifier};
use crate::metrics::recorder;
use crate::relay::storage::RelayStorage;
use crate::relay::types::{RelayError, RelayEvent, RelayResult, RelayStats, RelayStatsInner};
use crate::routing::RouteProvider;
use crate::sender::FileSender;
use crate::status::StatusReporter;
use crate::transfer::wire;
use crate::transfer::{
    Ack, HopEvent, HopState, HopStateMachine, Transfer, TransferError, TransferMetadata,
    TransferResult, TransferStatus,
};
use parking_lot::Mutex;
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};

const NACK_CHECKSUM: &str = "checksum verification failed";
const ACK_RECEIVED: &str = "File received successfully";

/// Log a progress line every this many chunks
const PROGRESS_EVERY_CHUNKS: u64 = 100;

/// Store-and-forward relay server
pub struct RelayServer<R, S> {
    ctx: Arc<HandlerContext<R, S>>,
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    running: AtomicBool,
    shutdown: Notify,
}

/// State shared by every connection handler
struct HandlerContext<R, S> {
    config: Arc<NodeConfig>,
    sender: Arc<FileSender<R, S>>,
    storage: RelayStorage,
    stats: RelayStatsInner,
    events: Mutex<Option<mpsc::UnboundedSender<RelayEvent>>>,
}

impl<R, S> RelayServer<R, S>
where
    R: RouteProvider + 'static,
    S: StatusReporter + 'static,
{
    /// Create the receive and relay directories and bind the listening socket
    pub async fn bind(sender: Arc<FileSender<R, S>>) -> RelayResult<Self> {
        let config = sender.config().clone();
        let storage = RelayStorage::new(&config.receive_dir, &config.relay_dir);
        storage.ensure_dirs().await?;

        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        tracing::info!(%local_addr, node = %config.node_id, "relay server bound");

        Ok(Self {
            ctx: Arc::new(HandlerContext {
                config,
                sender,
                storage,
                stats: RelayStatsInner::default(),
                events: Mutex::new(None),
            }),
            listener: Mutex::new(Some(listener)),
            local_addr,
            running: AtomicBool::new(true),
            shutdown: Notify::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn node_id(&self) -> &str {
        &self.ctx.config.node_id
    }

    pub fn storage(&self) -> &RelayStorage {
        &self.ctx.storage
    }

    pub fn stats(&self) -> RelayStats {
        self.ctx.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Receive an event for every finished connection. Replaces any
    /// previous subscriber.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RelayEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.ctx.events.lock() = Some(tx);
        rx
    }

    /// Accept connections until [`stop`](Self::stop) is called.
    ///
    /// Each connection is handled on its own task. The listening socket
    /// is closed when this returns; in-flight handlers keep running.
    pub async fn run(&self) -> RelayResult<()> {
        let listener = self.listener.lock().take().ok_or(RelayError::AlreadyStarted)?;
        let poll_interval = self.ctx.config.accept_poll_interval;

        tracing::info!(addr = %self.local_addr, node = %self.node_id(), "listening");

        while self.is_running() {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                accepted = tokio::time::timeout(poll_interval, listener.accept()) => {
                    match accepted {
                        // Poll interval elapsed; re-check the running flag
                        Err(_) => continue,
                        Ok(Ok((stream, peer))) => self.spawn_handler(stream, peer),
                        Ok(Err(e)) => {
                            if self.is_running() {
                                tracing::error!(error = %e, "error accepting connection");
                                tokio::time::sleep(Duration::from_millis(100)).await;
                            }
                        }
                    }
                }
            }
        }

        drop(listener);
        tracing::info!(addr = %self.local_addr, "relay server stopped");
        Ok(())
    }

    /// Stop accepting connections. Idempotent.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!(addr = %self.local_addr, "stopping relay server");
            self.shutdown.notify_waiters();
        }
    }

    fn spawn_handler(&self, stream: TcpStream, peer: SocketAddr) {
        tracing::info!(%peer, "connection accepted");
        RelayStatsInner::incr(&self.ctx.stats.connections_accepted);

        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            ctx.stats.active_handlers.fetch_add(1, Ordering::Relaxed);
            recorder::handler_started();

            let event = ctx.handle_connection(stream, peer).await;

            ctx.stats.active_handlers.fetch_sub(1, Ordering::Relaxed);
            recorder::handler_finished();
            ctx.emit(event);
        });
    }
}

impl<R, S> HandlerContext<R, S>
where
    R: RouteProvider,
    S: StatusReporter,
{
    fn emit(&self, event: RelayEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// Bound a single socket operation by the transfer timeout
    async fn bounded<T>(
        &self,
        op: impl Future<Output = TransferResult<T>>,
    ) -> TransferResult<T> {
        wire::bounded(self.config.transfer_timeout, op).await
    }

    async fn handle_connection(&self, mut stream: TcpStream, peer: SocketAddr) -> RelayEvent {
        let metadata = match self.bounded(wire::read_header(&mut stream)).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::error!(%peer, error = %e, "rejecting connection");
                RelayStatsInner::incr(&self.stats.rejected_connections);
                recorder::record_protocol_error(e.kind());
                return RelayEvent::Rejected {
                    peer,
                    reason: e.to_string(),
                };
            }
        };

        let (state, path) = self.process_transfer(stream, &metadata).await;
        RelayEvent::HopFinished {
            transfer_id: metadata.transfer_id,
            filename: metadata.filename,
            current_index: metadata.current_index,
            state,
            path,
        }
    }

    /// Drive one decoded transfer to a terminal [`HopState`]
    async fn process_transfer(
        &self,
        mut stream: TcpStream,
        metadata: &TransferMetadata,
    ) -> (HopState, Option<PathBuf>) {
        let transfer_id = metadata.transfer_id.as_str();
        let is_destination = metadata.is_destination();
        let mut sm = HopStateMachine::new(transfer_id);

        if metadata.route.node(metadata.current_index) != Some(self.config.node_id.as_str()) {
            tracing::warn!(
                %transfer_id,
                expected = ?metadata.route.node(metadata.current_index),
                node = %self.config.node_id,
                "frame addressed to a different node identity"
            );
        }

        tracing::info!(
            %transfer_id,
            filename = %metadata.filename,
            route = %metadata.route,
            current_index = metadata.current_index,
            file_size = metadata.file_size,
            is_destination,
            "receiving transfer"
        );

        let save_path = if is_destination {
            self.storage.staging_path(transfer_id)
        } else {
            self.storage.relay_path(transfer_id, &metadata.filename)
        };

        // RECEIVING
        let mut received = 0u64;
        let outcome = self
            .receive_payload(&mut stream, &save_path, metadata.file_size, &mut received)
            .await;
        let received = match outcome {
            Ok(()) => received,
            Err(e) => {
                tracing::error!(%transfer_id, error = %e, "receive failed");
                recorder::record_protocol_error(e.kind());
                RelayStatsInner::incr(&self.stats.rejected_connections);
                if matches!(e, TransferError::Io(_)) {
                    // Local failure: consume the rest of the frame so the
                    // sender gets as far as reading the NACK
                    let rest = metadata.file_size.saturating_sub(received);
                    if let Err(drain) = self.discard_payload(&mut stream, rest).await {
                        tracing::debug!(
                            %transfer_id,
                            error = %drain,
                            "could not drain payload"
                        );
                    }
                }
                // Reaches the sender only if it is still reading
                self.send_ack(&mut stream, &Ack::error(e.to_string()), transfer_id)
                    .await;
                let _ = sm.transition(HopEvent::ReceiveFailed);
                return (sm.current_state(), Some(save_path));
            }
        };
        let _ = sm.transition(HopEvent::PayloadReceived);
        RelayStatsInner::incr(&self.stats.transfers_received);
        self.stats
            .bytes_received
            .fetch_add(received, Ordering::Relaxed);
        recorder::record_transfer_received(received);
        tracing::info!(%transfer_id, bytes = received, "file received");

        // VERIFYING
        match IntegrityVerifier::verify_file(&save_path, &metadata.md5).await {
            Ok(digest) => tracing::info!(%transfer_id, %digest, "digest verified"),
            Err(IntegrityError::ChecksumMismatch { expected, actual }) => {
                tracing::error!(%transfer_id, %expected, %actual, "digest mismatch");
                self.send_ack(&mut stream, &Ack::error(NACK_CHECKSUM), transfer_id)
                    .await;
                RelayStatsInner::incr(&self.stats.checksum_failures);
                recorder::record_checksum_failure();
                let _ = sm.transition(HopEvent::ChecksumMismatched);
                return (sm.current_state(), Some(save_path));
            }
            Err(e) => {
                tracing::error!(%transfer_id, error = %e, "could not verify received file");
                self.send_ack(&mut stream, &Ack::error(e.to_string()), transfer_id)
                    .await;
                let _ = sm.transition(HopEvent::ReceiveFailed);
                return (sm.current_state(), Some(save_path));
            }
        }

        let final_path = if is_destination {
            match self.storage.promote(&save_path, &metadata.filename).await {
                Ok(path) => path,
                Err(e) => {
                    tracing::error!(%transfer_id, error = %e, "could not store delivered file");
                    self.send_ack(&mut stream, &Ack::error(e.to_string()), transfer_id)
                        .await;
                    let _ = sm.transition(HopEvent::ReceiveFailed);
                    return (sm.current_state(), Some(save_path));
                }
            }
        } else {
            save_path
        };

        if !self
            .send_ack(&mut stream, &Ack::ok(ACK_RECEIVED), transfer_id)
            .await
        {
            let _ = sm.transition(HopEvent::ReceiveFailed);
            return (sm.current_state(), Some(final_path));
        }
        // The upstream hop is done with this connection
        drop(stream);

        let status = if is_destination {
            TransferStatus::Done
        } else {
            TransferStatus::Pending
        };
        self.sender.report(transfer_id, status).await;

        let _ = sm.transition(HopEvent::ChecksumMatched { is_destination });

        if is_destination {
            RelayStatsInner::incr(&self.stats.transfers_delivered);
            recorder::record_delivered();
            tracing::info!(
                %transfer_id,
                path = %final_path.display(),
                "final destination reached"
            );
            return (sm.current_state(), Some(final_path));
        }

        // RELAYING
        let transfer = Transfer::from_metadata(metadata);
        tracing::info!(
            %transfer_id,
            next_hop = ?transfer.route.next_hop(transfer.current_index),
            "relaying to next hop"
        );

        match self.sender.forward_to_next_hop(&final_path, &transfer).await {
            Ok(_) => {
                let _ = sm.transition(HopEvent::ForwardSucceeded);
                RelayStatsInner::incr(&self.stats.transfers_relayed);
                if let Err(e) = self.storage.discard(&final_path).await {
                    tracing::warn!(%transfer_id, error = %e, "could not clean relay cache");
                    return (sm.current_state(), Some(final_path));
                }
                tracing::info!(%transfer_id, "relay successful");
                (sm.current_state(), None)
            }
            Err(e) => {
                let _ = sm.transition(HopEvent::ForwardFailed);
                RelayStatsInner::incr(&self.stats.relay_failures);
                tracing::error!(
                    %transfer_id,
                    error = %e,
                    path = %final_path.display(),
                    "relay failed; copy kept in relay cache"
                );
                (sm.current_state(), Some(final_path))
            }
        }
    }

    /// Copy exactly `file_size` payload bytes into `path`, counting them
    /// in `received`.
    ///
    /// Bytes received before a short read stay on disk.
    async fn receive_payload(
        &self,
        stream: &mut TcpStream,
        path: &Path,
        file_size: u64,
        received: &mut u64,
    ) -> TransferResult<()> {
        let mut file = self.storage.create(path).await?;
        let chunk_size = self.config.chunk_size;
        let mut buffer = vec![0u8; chunk_size];
        let mut chunks = 0u64;

        while *received < file_size {
            let want = (file_size - *received).min(chunk_size as u64) as usize;
            let n = match self.read_chunk(stream, &mut buffer[..want]).await {
                Ok(0) => {
                    file.flush().await?;
                    return Err(TransferError::Transport(format!(
                        "short read: peer closed after {} of {file_size} bytes",
                        *received
                    )));
                }
                Ok(n) => n,
                Err(e) => {
                    file.flush().await?;
                    return Err(e);
                }
            };

            // Counted once off the socket, even if the disk write fails
            *received += n as u64;
            file.write_all(&buffer[..n]).await?;
            chunks += 1;

            if chunks % PROGRESS_EVERY_CHUNKS == 0 {
                tracing::debug!(
                    received = *received,
                    file_size,
                    percent = *received as f64 / file_size as f64 * 100.0,
                    "receive progress"
                );
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Read and drop `remaining` payload bytes
    async fn discard_payload(
        &self,
        stream: &mut TcpStream,
        mut remaining: u64,
    ) -> TransferResult<()> {
        let mut buffer = vec![0u8; self.config.chunk_size];
        while remaining > 0 {
            let want = remaining.min(buffer.len() as u64) as usize;
            match self.read_chunk(stream, &mut buffer[..want]).await? {
                0 => break,
                n => remaining -= n as u64,
            }
        }
        Ok(())
    }

    /// One payload read, bounded by the transfer timeout
    async fn read_chunk(
        &self,
        stream: &mut TcpStream,
        buffer: &mut [u8],
    ) -> TransferResult<usize> {
        self.bounded(async {
            stream
                .read(buffer)
                .await
                .map_err(|e| TransferError::transport("read payload", e))
        })
        .await
    }

    /// Write an acknowledgment and half-close. Returns false on failure.
    async fn send_ack(&self, stream: &mut TcpStream, ack: &Ack, transfer_id: &str) -> bool {
        let result = self
            .bounded(async {
                wire::write_ack(stream, ack).await?;
                let _ = stream.shutdown().await;
                Ok(())
            })
            .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(%transfer_id, error = %e, "could not send acknowledgment");
                false
            }
        }
    }
}
