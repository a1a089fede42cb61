use crate::integrity::IntegrityError;
use crate::routing::RoutingError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure of a send, a forward, or an inbound transfer
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Routing service unavailable: {0}")]
    RoutingUnavailable(String),

    #[error("No route: {0}")]
    NoRoute(String),

    #[error("Already at destination (index {index} of route length {route_len})")]
    AlreadyAtDestination { index: u32, route_len: usize },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Next hop {next_hop} rejected transfer: {message}")]
    NextHopRejected { next_hop: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// Short stable label for logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            TransferError::FileNotFound(_) => "file_not_found",
            TransferError::RoutingUnavailable(_) => "routing_unavailable",
            TransferError::NoRoute(_) => "no_route",
            TransferError::AlreadyAtDestination { .. } => "already_at_destination",
            TransferError::Protocol(_) => "protocol",
            TransferError::ChecksumMismatch { .. } => "checksum_mismatch",
            TransferError::Transport(_) => "transport",
            TransferError::Timeout(_) => "timeout",
            TransferError::NextHopRejected { .. } => "next_hop_rejected",
            TransferError::Io(_) => "io",
        }
    }

    /// Map a socket-level error, keeping what was being attempted
    pub(crate) fn transport(context: &str, err: std::io::Error) -> Self {
        TransferError::Transport(format!("{context}: {err}"))
    }
}

impl From<RoutingError> for TransferError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::NoRoute { .. } => TransferError::NoRoute(err.to_string()),
            other => TransferError::RoutingUnavailable(other.to_string()),
        }
    }
}

impl From<IntegrityError> for TransferError {
    fn from(err: IntegrityError) -> Self {
        match err {
            IntegrityError::ChecksumMismatch { expected, actual } => {
                TransferError::ChecksumMismatch { expected, actual }
            }
            IntegrityError::FileNotFound(path) => TransferError::FileNotFound(PathBuf::from(path)),
            IntegrityError::InvalidDigest(digest) => {
                TransferError::Protocol(format!("invalid digest {digest:?}"))
            }
            IntegrityError::IoError(e) => TransferError::Io(e),
        }
    }
}

pub type TransferResult<T> = Result<T, TransferError>;
