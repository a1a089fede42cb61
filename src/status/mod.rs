//! Fire-and-forget notifications to the transfer timeline service

pub mod client;
pub mod error;

pub use client::{HttpStatusClient, StatusReporter, StatusUpdate};
pub use error::{StatusError, StatusResult};
