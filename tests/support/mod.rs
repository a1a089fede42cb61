//! Shared fixtures for relay integration tests

#![allow(dead_code)]

use hoplink::config::NodeConfig;
use hoplink::relay::{RelayEvent, RelayServer};
use hoplink::routing::{Algorithm, RouteProvider, RoutingError, RoutingResult};
use hoplink::status::{StatusReporter, StatusResult, StatusUpdate};
use hoplink::transfer::Route;
use hoplink::FileSender;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub type TestSender = FileSender<StaticRoutes, RecordingReporter>;
pub type TestServer = RelayServer<StaticRoutes, RecordingReporter>;

/// Route provider answering from a fixed table
#[derive(Clone, Default)]
pub struct StaticRoutes {
    routes: HashMap<(String, String), Vec<String>>,
}

impl StaticRoutes {
    pub fn with(mut self, path: &[&str]) -> Self {
        let (Some(first), Some(last)) = (path.first(), path.last()) else {
            return self;
        };
        self.routes.insert(
            (first.to_string(), last.to_string()),
            path.iter().map(|n| n.to_string()).collect(),
        );
        self
    }

    /// Answer `source -> destination` with an explicit (possibly degenerate) path
    pub fn with_answer(mut self, source: &str, destination: &str, path: &[&str]) -> Self {
        self.routes.insert(
            (source.to_string(), destination.to_string()),
            path.iter().map(|n| n.to_string()).collect(),
        );
        self
    }
}

impl RouteProvider for StaticRoutes {
    async fn find_route(
        &self,
        source: &str,
        destination: &str,
        _algorithm: Algorithm,
        on_step: &mut (dyn FnMut(&serde_json::Value) + Send),
    ) -> RoutingResult<Route> {
        on_step(&serde_json::json!({ "visited": source }));
        let path = self
            .routes
            .get(&(source.to_string(), destination.to_string()))
            .cloned()
            .ok_or_else(|| RoutingError::NoRoute {
                origin: source.to_string(),
                destination: destination.to_string(),
            })?;
        Ok(Route::new(path))
    }
}

/// Status sink that remembers every update
#[derive(Clone, Default)]
pub struct RecordingReporter {
    updates: Arc<Mutex<Vec<StatusUpdate>>>,
}

impl RecordingReporter {
    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().clone()
    }
}

impl StatusReporter for RecordingReporter {
    async fn report(&self, update: StatusUpdate) -> StatusResult<()> {
        self.updates.lock().push(update);
        Ok(())
    }
}

/// Config for a node whose directories live under `root/<node_id>`
pub fn node_config(
    root: &Path,
    node_id: &str,
    peers: HashMap<String, SocketAddr>,
) -> NodeConfig {
    let dir = root.join(node_id);
    NodeConfig {
        node_id: node_id.to_string(),
        bind_host: "127.0.0.1".to_string(),
        port: 0,
        chunk_size: 1024,
        transfer_timeout: Duration::from_secs(3),
        accept_poll_interval: Duration::from_millis(50),
        send_dir: dir.join("send-file"),
        receive_dir: dir.join("receive-file"),
        relay_dir: dir.join("relay-cache"),
        peers,
        ..Default::default()
    }
}

/// A running relay node
pub struct TestNode {
    pub server: Arc<TestServer>,
    pub sender: Arc<TestSender>,
    pub reporter: RecordingReporter,
    pub events: mpsc::UnboundedReceiver<RelayEvent>,
    pub addr: SocketAddr,
}

impl TestNode {
    pub async fn start(config: NodeConfig, routes: StaticRoutes) -> Self {
        let reporter = RecordingReporter::default();
        let sender = Arc::new(FileSender::new(
            Arc::new(config),
            routes,
            reporter.clone(),
        ));
        let server = Arc::new(RelayServer::bind(sender.clone()).await.unwrap());
        let events = server.subscribe();
        let addr = server.local_addr();

        let runner = server.clone();
        tokio::spawn(async move { runner.run().await });

        Self {
            server,
            sender,
            reporter,
            events,
            addr,
        }
    }

    pub async fn next_event(&mut self) -> RelayEvent {
        tokio::time::timeout(Duration::from_secs(10), self.events.recv())
            .await
            .expect("timed out waiting for relay event")
            .expect("event channel closed")
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.server.stop();
    }
}

/// Deterministic test payload
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

pub fn peers(entries: &[(&str, SocketAddr)]) -> HashMap<String, SocketAddr> {
    entries
        .iter()
        .map(|(node, addr)| (node.to_string(), *addr))
        .collect()
}
