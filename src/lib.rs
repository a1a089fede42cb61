//! hoplink - hop-by-hop store-and-forward file relay
//!
//! A file travels along a route computed by an external path service.
//! Each node receives the whole file, checks its MD5 digest, stores it,
//! and pushes it to the next node over a fresh TCP connection.

pub mod config;
pub mod integrity;
pub mod metrics;
pub mod relay;
pub mod routing;
pub mod sender;
pub mod status;
pub mod transfer;

pub use config::{Cli, Command, NodeArgs, NodeConfig};
pub use relay::{RelayEvent, RelayServer, RelayStats};
pub use routing::{Algorithm, HttpRouteClient, RouteProvider};
pub use sender::{FileSender, HopReceipt};
pub use status::{HttpStatusClient, StatusReporter, StatusUpdate};
pub use transfer::{HopState, Route, Transfer, TransferError, TransferMetadata, TransferStatus};
