//! Metrics and observability module
//!
//! Counters and histograms for relay activity, exportable to Prometheus.
//!
//! Key metrics exposed:
//! - Transfers received, delivered, relayed and failed per hop
//! - Bytes received and sent
//! - Hop duration (connect + payload + ack)
//! - In-flight connection handlers

pub mod exporter;
pub mod recorder;

pub use exporter::{start_metrics_server, MetricsError};
pub use recorder::{init_metrics, HopTimer};
