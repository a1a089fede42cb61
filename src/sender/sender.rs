//! Pushes a file to the next node of its route.
//!
//! Every hop is one TCP connection carrying one frame. The sender blocks
//! on the receiver's acknowledgment and never retries; the connection is
//! dropped on every exit path, including timeouts. The transfer timeout
//! bounds each socket operation (connect, header, every payload chunk,
//! ack), not the hop as a whole.

use crate::config::NodeConfig;
use crate::integrity::IntegrityVerifier;
use crate::metrics::recorder::{record_relay_failure, record_relayed, HopTimer};
use crate::routing::{Algorithm, RouteProvider};
use crate::status::{StatusReporter, StatusUpdate};
use crate::transfer::types::validate_filename;
use crate::transfer::wire;
use crate::transfer::{
    timestamp_now, Transfer, TransferError, TransferMetadata, TransferResult, TransferStatus,
};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Result of one successful hop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopReceipt {
    pub next_hop: String,
    /// Index carried in the frame, i.e. the receiver's position in the route
    pub receiver_index: u32,
    pub bytes_sent: u64,
    pub ack_message: String,
}

pub struct FileSender<R, S> {
    config: Arc<NodeConfig>,
    router: R,
    reporter: S,
}

impl<R: RouteProvider, S: StatusReporter> FileSender<R, S> {
    pub fn new(config: Arc<NodeConfig>, router: R, reporter: S) -> Self {
        Self {
            config,
            router,
            reporter,
        }
    }

    pub fn config(&self) -> &Arc<NodeConfig> {
        &self.config
    }

    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    pub fn reporter(&self) -> &S {
        &self.reporter
    }

    /// Route `filename` from the send directory to `destination`.
    ///
    /// Returns the transfer as originated here once the first hop has
    /// acknowledged it.
    pub async fn send_to_destination(
        &self,
        filename: &str,
        destination: &str,
        algorithm: Algorithm,
    ) -> TransferResult<Transfer> {
        validate_filename(filename)?;
        let file_path = self.config.send_dir.join(filename);

        let is_file = tokio::fs::metadata(&file_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            tracing::error!(path = %file_path.display(), "file not found");
            return Err(TransferError::FileNotFound(file_path));
        }

        let source = self.node_id();
        tracing::info!(%filename, %source, %destination, %algorithm, "starting file transfer");

        let mut steps = 0usize;
        let mut on_step = |step: &serde_json::Value| {
            steps += 1;
            tracing::debug!(%step, "route search step");
        };
        let route = self
            .router
            .find_route(source, destination, algorithm, &mut on_step)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "route lookup failed");
                TransferError::from(e)
            })?;
        tracing::debug!(steps, "route search finished");

        if route.len() < 2 {
            return Err(TransferError::NoRoute(format!(
                "route to {destination} has {} node(s)",
                route.len()
            )));
        }
        if route.origin() != Some(source) {
            return Err(TransferError::NoRoute(format!(
                "route starts at {:?}, not at this node {source}",
                route.origin().unwrap_or_default()
            )));
        }

        tracing::info!(%route, "route found");

        let transfer = Transfer::originate(filename, route);
        self.forward_to_next_hop(&file_path, &transfer).await?;

        tracing::info!(transfer_id = %transfer.transfer_id, "file sent successfully");
        self.report(&transfer.transfer_id, TransferStatus::Pending)
            .await;

        Ok(transfer)
    }

    /// Push the file at `file_path` to `route[current_index + 1]`.
    ///
    /// The origin's digest is computed before any socket is opened.
    pub async fn forward_to_next_hop(
        &self,
        file_path: &Path,
        transfer: &Transfer,
    ) -> TransferResult<HopReceipt> {
        let next_hop = transfer
            .route
            .next_hop(transfer.current_index)
            .ok_or(TransferError::AlreadyAtDestination {
                index: transfer.current_index,
                route_len: transfer.route.len(),
            })?;

        let timer = HopTimer::start();
        let result = self.push_frame(file_path, transfer, next_hop).await;

        match result {
            Ok(receipt) => {
                let elapsed = timer.finish(receipt.bytes_sent);
                record_relayed();
                tracing::info!(
                    transfer_id = %transfer.transfer_id,
                    %next_hop,
                    bytes = receipt.bytes_sent,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "hop acknowledged"
                );
                Ok(receipt)
            }
            Err(e) => {
                record_relay_failure(e.kind());
                tracing::error!(
                    transfer_id = %transfer.transfer_id,
                    %next_hop,
                    error = %e,
                    "hop failed"
                );
                Err(e)
            }
        }
    }

    async fn push_frame(
        &self,
        file_path: &Path,
        transfer: &Transfer,
        next_hop: &str,
    ) -> TransferResult<HopReceipt> {
        let file_size = IntegrityVerifier::file_size(file_path).await?;
        let digest = match &transfer.digest {
            Some(digest) => digest.clone(),
            None => IntegrityVerifier::calculate_file_checksum(file_path).await?,
        };

        let metadata = TransferMetadata {
            transfer_id: transfer.transfer_id.clone(),
            filename: transfer.filename.clone(),
            route: transfer.route.clone(),
            current_index: transfer.current_index + 1,
            file_size,
            md5: digest,
            timestamp: timestamp_now(),
        };

        let timeout = self.config.transfer_timeout;
        let mut stream = wire::bounded(timeout, self.connect(next_hop)).await?;

        wire::bounded(timeout, wire::write_header(&mut stream, &metadata)).await?;
        let bytes_sent = self.stream_file(file_path, file_size, &mut stream).await?;
        wire::bounded(timeout, async {
            stream
                .flush()
                .await
                .map_err(|e| TransferError::transport("flush payload", e))
        })
        .await?;

        let ack = wire::bounded(timeout, wire::read_ack(&mut stream)).await?;
        if !ack.is_ok() {
            return Err(TransferError::NextHopRejected {
                next_hop: next_hop.to_string(),
                message: ack.message,
            });
        }

        Ok(HopReceipt {
            next_hop: next_hop.to_string(),
            receiver_index: metadata.current_index,
            bytes_sent,
            ack_message: ack.message,
        })
    }

    /// Dial a node on the relay port, honouring peer address overrides
    async fn connect(&self, node: &str) -> TransferResult<TcpStream> {
        let stream = match self.config.peers.get(node) {
            Some(addr) => TcpStream::connect(addr).await,
            None => TcpStream::connect((node, self.config.port)).await,
        };
        let stream = stream.map_err(|e| TransferError::transport(&format!("connect {node}"), e))?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }

    /// Send exactly `file_size` bytes of the file, one timed write per chunk
    async fn stream_file(
        &self,
        file_path: &Path,
        file_size: u64,
        stream: &mut TcpStream,
    ) -> TransferResult<u64> {
        let file = tokio::fs::File::open(file_path).await?;
        let mut file = file.take(file_size);
        let mut buffer = vec![0u8; self.config.chunk_size];
        let mut sent = 0u64;

        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            wire::bounded(self.config.transfer_timeout, async {
                stream
                    .write_all(&buffer[..n])
                    .await
                    .map_err(|e| TransferError::transport("send payload", e))
            })
            .await?;
            sent += n as u64;
        }

        if sent != file_size {
            return Err(TransferError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("file shrank while sending: {sent} of {file_size} bytes"),
            )));
        }
        Ok(sent)
    }

    /// Send a timeline update; failures are logged and ignored
    pub async fn report(&self, transfer_id: &str, status: TransferStatus) {
        let update = StatusUpdate::new(transfer_id, self.node_id(), status);
        if let Err(e) = self.reporter.report(update).await {
            tracing::warn!(%transfer_id, %status, error = %e, "timeline update failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{RoutingError, RoutingResult};
    use crate::status::StatusResult;
    use crate::transfer::{Ack, Route};
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    struct NoRoutes;

    impl RouteProvider for NoRoutes {
        async fn find_route(
            &self,
            source: &str,
            destination: &str,
            _algorithm: Algorithm,
            _on_step: &mut (dyn FnMut(&serde_json::Value) + Send),
        ) -> RoutingResult<Route> {
            Err(RoutingError::NoRoute {
                origin: source.to_string(),
                destination: destination.to_string(),
            })
        }
    }

    struct Silent;

    impl StatusReporter for Silent {
        async fn report(&self, _update: StatusUpdate) -> StatusResult<()> {
            Ok(())
        }
    }

    fn sender(dir: &TempDir, peers: HashMap<String, std::net::SocketAddr>) -> FileSender<NoRoutes, Silent> {
        let config = NodeConfig {
            node_id: "A".into(),
            chunk_size: 64,
            transfer_timeout: Duration::from_secs(2),
            send_dir: dir.path().to_path_buf(),
            peers,
            ..Default::default()
        };
        FileSender::new(Arc::new(config), NoRoutes, Silent)
    }

    fn transfer(route: &[&str], index: u32) -> Transfer {
        Transfer {
            transfer_id: "t-1".into(),
            filename: "data.bin".into(),
            route: Route::new(route.iter().map(|n| n.to_string()).collect()),
            current_index: index,
            digest: None,
        }
    }

    #[tokio::test]
    async fn test_forward_from_destination_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, b"abc").await.unwrap();

        let err = sender(&dir, HashMap::new())
            .forward_to_next_hop(&path, &transfer(&["A", "B"], 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::AlreadyAtDestination { index: 1, route_len: 2 }
        ));
    }

    #[tokio::test]
    async fn test_frame_and_nack() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
        tokio::fs::write(&path, &data).await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let peer = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let metadata = wire::read_header(&mut stream).await.unwrap();
            let mut payload = vec![0u8; metadata.file_size as usize];
            stream.read_exact(&mut payload).await.unwrap();
            wire::write_ack(&mut stream, &Ack::error("disk full"))
                .await
                .unwrap();
            (metadata, payload)
        });

        let sender = sender(&dir, HashMap::from([("B".to_string(), addr)]));
        let err = sender
            .forward_to_next_hop(&path, &transfer(&["A", "B", "C"], 0))
            .await
            .unwrap_err();
        match err {
            TransferError::NextHopRejected { next_hop, message } => {
                assert_eq!(next_hop, "B");
                assert_eq!(message, "disk full");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let (metadata, payload) = peer.await.unwrap();
        assert_eq!(metadata.current_index, 1);
        assert_eq!(metadata.file_size, 1000);
        assert_eq!(metadata.md5, IntegrityVerifier::calculate_checksum(&data));
        assert_eq!(payload, data);
    }

    #[tokio::test]
    async fn test_carried_digest_is_sent_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, b"relay copy").await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let metadata = wire::read_header(&mut stream).await.unwrap();
            let mut payload = vec![0u8; metadata.file_size as usize];
            stream.read_exact(&mut payload).await.unwrap();
            wire::write_ack(&mut stream, &Ack::ok("File received successfully"))
                .await
                .unwrap();
            metadata
        });

        let mut relayed = transfer(&["A", "B", "C"], 1);
        relayed.digest = Some("0123456789abcdef0123456789abcdef".into());

        let sender = sender(&dir, HashMap::from([("C".to_string(), addr)]));
        let receipt = sender.forward_to_next_hop(&path, &relayed).await.unwrap();
        assert_eq!(receipt.next_hop, "C");
        assert_eq!(receipt.receiver_index, 2);
        assert_eq!(receipt.bytes_sent, 10);

        let metadata = peer.await.unwrap();
        assert_eq!(metadata.md5, "0123456789abcdef0123456789abcdef");
    }

    #[tokio::test]
    async fn test_refused_connection_fails_fast() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, b"abc").await.unwrap();

        let dead = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let sender = sender(&dir, HashMap::from([("B".to_string(), dead)]));

        let err = sender
            .forward_to_next_hop(&path, &transfer(&["A", "B"], 0))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Transport(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_send_requires_existing_file() {
        let dir = TempDir::new().unwrap();
        let err = sender(&dir, HashMap::new())
            .send_to_destination("absent.bin", "C", Algorithm::Astar)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_slow_but_steady_peer_completes() {
        const CHUNK: usize = 64 * 1024;
        const READ: usize = 256 * 1024;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        let data: Vec<u8> = (0..12 * 1024 * 1024u32).map(|i| (i % 253) as u8).collect();
        tokio::fs::write(&path, &data).await.unwrap();

        // Small receive window so the payload cannot sit in kernel buffers
        let socket = tokio::net::TcpSocket::new_v4().unwrap();
        socket.set_recv_buffer_size(64 * 1024).unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = socket.listen(16).unwrap();
        let addr = listener.local_addr().unwrap();

        // Drains 256 KiB every 25ms: the hop takes longer than the
        // timeout, but no single operation waits that long.
        let peer = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let metadata = wire::read_header(&mut stream).await.unwrap();
            let mut remaining = metadata.file_size as usize;
            let mut buffer = vec![0u8; READ];
            while remaining > 0 {
                let n = remaining.min(READ);
                stream.read_exact(&mut buffer[..n]).await.unwrap();
                remaining -= n;
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            wire::write_ack(&mut stream, &Ack::ok("File received successfully"))
                .await
                .unwrap();
        });

        let config = NodeConfig {
            node_id: "A".into(),
            chunk_size: CHUNK,
            transfer_timeout: Duration::from_secs(1),
            send_dir: dir.path().to_path_buf(),
            peers: HashMap::from([("B".to_string(), addr)]),
            ..Default::default()
        };
        let sender = FileSender::new(Arc::new(config), NoRoutes, Silent);

        let started = std::time::Instant::now();
        let receipt = sender
            .forward_to_next_hop(&path, &transfer(&["A", "B"], 0))
            .await
            .unwrap();
        assert_eq!(receipt.bytes_sent, data.len() as u64);
        assert!(started.elapsed() > Duration::from_secs(1));

        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_stalled_peer_times_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, b"abc").await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accepts and reads everything, then never answers
        let peer = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let metadata = wire::read_header(&mut stream).await.unwrap();
            let mut payload = vec![0u8; metadata.file_size as usize];
            stream.read_exact(&mut payload).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let config = NodeConfig {
            node_id: "A".into(),
            transfer_timeout: Duration::from_millis(300),
            peers: HashMap::from([("B".to_string(), addr)]),
            ..Default::default()
        };
        let sender = FileSender::new(Arc::new(config), NoRoutes, Silent);

        let err = sender
            .forward_to_next_hop(&path, &transfer(&["A", "B"], 0))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Timeout(_)), "{err:?}");
        peer.abort();
    }
}
