//! Relay types and statistics

use crate::transfer::HopState;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Result type for relay server operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Relay server errors (per-connection failures never surface here)
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Relay server already started")]
    AlreadyStarted,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How one inbound connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A frame was decoded and the hop reached a terminal state
    HopFinished {
        transfer_id: String,
        filename: String,
        current_index: u32,
        state: HopState,
        /// Where the file rests afterwards, if anywhere
        path: Option<PathBuf>,
    },

    /// The connection was closed before a valid frame header arrived
    Rejected { peer: SocketAddr, reason: String },
}

/// Statistics for a relay server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStats {
    pub connections_accepted: u64,
    pub transfers_received: u64,
    pub transfers_delivered: u64,
    pub transfers_relayed: u64,
    pub relay_failures: u64,
    pub checksum_failures: u64,
    pub rejected_connections: u64,
    pub bytes_received: u64,
    pub active_handlers: u64,
}

impl RelayStats {
    /// Share of verified transfers that reached a good terminal state
    pub fn success_rate(&self) -> f64 {
        let total = self.transfers_delivered + self.transfers_relayed + self.relay_failures;
        if total == 0 {
            return 100.0;
        }
        (self.transfers_delivered + self.transfers_relayed) as f64 / total as f64 * 100.0
    }
}

impl std::fmt::Display for RelayStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Relay: {} delivered, {} relayed, {} relay failed, {} checksum failed, {} rejected ({:.1}% success)",
            self.transfers_delivered,
            self.transfers_relayed,
            self.relay_failures,
            self.checksum_failures,
            self.rejected_connections,
            self.success_rate()
        )
    }
}

#[derive(Default)]
pub(crate) struct RelayStatsInner {
    pub connections_accepted: AtomicU64,
    pub transfers_received: AtomicU64,
    pub transfers_delivered: AtomicU64,
    pub transfers_relayed: AtomicU64,
    pub relay_failures: AtomicU64,
    pub checksum_failures: AtomicU64,
    pub rejected_connections: AtomicU64,
    pub bytes_received: AtomicU64,
    pub active_handlers: AtomicU64,
}

impl RelayStatsInner {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayStats {
        RelayStats {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            transfers_received: self.transfers_received.load(Ordering::Relaxed),
            transfers_delivered: self.transfers_delivered.load(Ordering::Relaxed),
            transfers_relayed: self.transfers_relayed.load(Ordering::Relaxed),
            relay_failures: self.relay_failures.load(Ordering::Relaxed),
            checksum_failures: self.checksum_failures.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            active_handlers: self.active_handlers.load(Ordering::Relaxed),
        }
    }
}
