//! Configuration management for hoplink
//!
//! Every option is available both as a command-line flag and as an
//! environment variable, so a node can be configured entirely from its
//! container environment.

use crate::routing::Algorithm;
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default relay port used by every node
pub const DEFAULT_RELAY_PORT: u16 = 7000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid peer entry {0:?}: expected NODE=HOST:PORT")]
    InvalidPeer(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Parser, Debug)]
#[command(name = "hoplink")]
#[command(about = "Hop-by-hop file relay for integrated space/air/ground/sea networks", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub node: NodeArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the relay server and block until interrupted
    Listen,

    /// Send a file from the send directory to a destination node
    Send {
        /// Filename inside the send directory
        filename: String,

        /// Destination node identifier
        destination: String,

        /// Routing algorithm (defaults to --algorithm)
        #[arg(long = "algo", value_enum)]
        algo: Option<Algorithm>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct NodeArgs {
    /// Identity of this node in the topology
    #[arg(long, env = "HOST_NAME", global = true)]
    pub node_id: Option<String>,

    /// Relay bind host
    #[arg(long, env = "NODE_HOST", default_value = "0.0.0.0", global = true)]
    pub host: String,

    /// Relay port (also the port dialed on every next hop)
    #[arg(long, env = "NODE_PORT", default_value_t = DEFAULT_RELAY_PORT, global = true)]
    pub port: u16,

    /// Base URL of the path-computation service
    #[arg(long, env = "HEURISTIC_ADDR", default_value = "http://localhost:50052", global = true)]
    pub routing_url: String,

    /// Base URL of the transfer timeline service
    #[arg(long, env = "TIMELINE_BACKEND_URL", default_value = "http://localhost:50053", global = true)]
    pub status_url: String,

    /// Default routing algorithm
    #[arg(long, env = "ALGORITHM", value_enum, default_value_t = Algorithm::Astar, global = true)]
    pub algorithm: Algorithm,

    /// Chunk size for streaming file I/O, in bytes
    #[arg(long, env = "CHUNK_SIZE", default_value_t = 8192, global = true)]
    pub chunk_size: usize,

    /// Connect/transfer timeout in seconds
    #[arg(long, env = "TRANSFER_TIMEOUT", default_value_t = 30, global = true)]
    pub timeout_secs: u64,

    /// Outbound file directory
    #[arg(long, env = "SEND_DIR", default_value = "send-file", global = true)]
    pub send_dir: PathBuf,

    /// Permanent receive directory
    #[arg(long, env = "RECEIVE_DIR", default_value = "receive-file", global = true)]
    pub receive_dir: PathBuf,

    /// Relay cache directory
    #[arg(long, env = "RELAY_DIR", default_value = "relay-cache", global = true)]
    pub relay_dir: PathBuf,

    /// Address override for a node, NODE=HOST:PORT (repeatable)
    #[arg(long = "peer", env = "RELAY_PEERS", value_delimiter = ',', global = true)]
    pub peers: Vec<String>,

    /// Serve Prometheus metrics on this address while listening
    #[arg(long, env = "METRICS_ADDR", global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Logging level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,
}

/// Runtime configuration for a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_id: String,
    pub bind_host: String,
    pub port: u16,
    pub routing_url: String,
    pub status_url: String,
    pub algorithm: Algorithm,
    pub chunk_size: usize,
    pub transfer_timeout: Duration,
    pub accept_poll_interval: Duration,
    pub send_dir: PathBuf,
    pub receive_dir: PathBuf,
    pub relay_dir: PathBuf,
    #[serde(default)]
    pub peers: HashMap<String, SocketAddr>,
    pub metrics_addr: Option<SocketAddr>,
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "localhost".to_string(),
            bind_host: "0.0.0.0".to_string(),
            port: DEFAULT_RELAY_PORT,
            routing_url: "http://localhost:50052".to_string(),
            status_url: "http://localhost:50053".to_string(),
            algorithm: Algorithm::Astar,
            chunk_size: 8192,
            transfer_timeout: Duration::from_secs(30),
            accept_poll_interval: Duration::from_secs(1),
            send_dir: PathBuf::from("send-file"),
            receive_dir: PathBuf::from("receive-file"),
            relay_dir: PathBuf::from("relay-cache"),
            peers: HashMap::new(),
            metrics_addr: None,
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Build a config from parsed arguments
    pub fn from_args(args: NodeArgs) -> ConfigResult<Self> {
        let node_id = args.node_id.ok_or_else(|| {
            ConfigError::Invalid("node identity is required (--node-id or HOST_NAME)".into())
        })?;

        let config = Self {
            node_id,
            bind_host: args.host,
            port: args.port,
            routing_url: args.routing_url,
            status_url: args.status_url,
            algorithm: args.algorithm,
            chunk_size: args.chunk_size,
            transfer_timeout: Duration::from_secs(args.timeout_secs),
            accept_poll_interval: Duration::from_secs(1),
            send_dir: args.send_dir,
            receive_dir: args.receive_dir,
            relay_dir: args.relay_dir,
            peers: parse_peers(&args.peers)?,
            metrics_addr: args.metrics_addr,
            log_level: args.log_level,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.node_id.trim().is_empty() {
            return Err(ConfigError::Invalid("node identity must not be empty".into()));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk size must be positive".into()));
        }
        if self.transfer_timeout.is_zero() {
            return Err(ConfigError::Invalid("transfer timeout must be positive".into()));
        }
        if self.accept_poll_interval.is_zero() {
            return Err(ConfigError::Invalid("accept poll interval must be positive".into()));
        }
        Ok(())
    }

    /// Address the relay server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

fn parse_peers(entries: &[String]) -> ConfigResult<HashMap<String, SocketAddr>> {
    let mut peers = HashMap::new();
    for entry in entries.iter().map(|e| e.trim()).filter(|e| !e.is_empty()) {
        let (node, addr) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidPeer(entry.to_string()))?;
        let addr: SocketAddr = addr
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidPeer(entry.to_string()))?;
        let node = node.trim();
        if node.is_empty() {
            return Err(ConfigError::InvalidPeer(entry.to_string()));
        }
        peers.insert(node.to_string(), addr);
    }
    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.port, 7000);
        assert_eq!(config.chunk_size, 8192);
        assert_eq!(config.transfer_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_send_command() {
        let cli = parse(&[
            "hoplink",
            "--node-id",
            "ground-1",
            "send",
            "report.pdf",
            "sat-3",
            "--algo",
            "dijkstra",
        ]);

        match cli.command {
            Command::Send {
                filename,
                destination,
                algo,
            } => {
                assert_eq!(filename, "report.pdf");
                assert_eq!(destination, "sat-3");
                assert_eq!(algo, Some(Algorithm::Dijkstra));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_config_from_args() {
        let cli = parse(&[
            "hoplink",
            "listen",
            "--node-id",
            "relay-b",
            "--port",
            "7100",
            "--chunk-size",
            "4096",
            "--timeout-secs",
            "5",
            "--peer",
            "relay-c=127.0.0.1:7200",
        ]);
        assert!(matches!(cli.command, Command::Listen));

        let config = NodeConfig::from_args(cli.node).unwrap();
        assert_eq!(config.node_id, "relay-b");
        assert_eq!(config.port, 7100);
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.transfer_timeout, Duration::from_secs(5));
        assert_eq!(
            config.peers.get("relay-c"),
            Some(&"127.0.0.1:7200".parse().unwrap())
        );
        assert_eq!(config.bind_addr(), "0.0.0.0:7100");
    }

    #[test]
    fn test_missing_node_id() {
        let mut cli = parse(&["hoplink", "listen"]);
        cli.node.node_id = None;
        assert!(matches!(
            NodeConfig::from_args(cli.node),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let config = NodeConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_peers() {
        let peers = parse_peers(&[
            "a=127.0.0.1:7001".to_string(),
            " b = 127.0.0.1:7002 ".to_string(),
            "".to_string(),
        ])
        .unwrap();
        assert_eq!(peers.len(), 2);

        assert!(parse_peers(&["no-equals".to_string()]).is_err());
        assert!(parse_peers(&["a=not-an-addr".to_string()]).is_err());
        assert!(parse_peers(&["=127.0.0.1:1".to_string()]).is_err());
    }
}
