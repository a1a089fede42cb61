//! Store-and-forward relay
//!
//! Every node runs a [`RelayServer`]. A received file is held on local
//! disk until its digest checks out, then either delivered (last node of
//! the route) or pushed one hop further. Files that cannot be forwarded
//! stay in the relay cache.

pub mod server;
pub mod storage;
pub mod types;

pub use server::RelayServer;
pub use storage::RelayStorage;
pub use types::{RelayError, RelayEvent, RelayResult, RelayStats};
