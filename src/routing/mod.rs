//! Client side of the external path-computation service

pub mod client;
pub mod error;
pub mod types;

pub use client::{HttpRouteClient, RouteProvider};
pub use error::{RoutingError, RoutingResult};
pub use types::{Algorithm, RouteEvent, RouteRequest};
