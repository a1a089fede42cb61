//! Prometheus metrics exporter
//!
//! Exposes metrics via HTTP for Prometheus scraping.

use crate::metrics::recorder::init_metrics;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

static EXPORTER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Errors that can occur during metrics setup
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to setup metrics: {0}")]
    SetupFailed(String),

    #[error("Metrics already initialized")]
    AlreadyInitialized,
}

/// Install the global recorder and serve `/metrics` on `listen_addr`.
///
/// Must be called from within a tokio runtime. Only the first call
/// installs anything.
pub fn start_metrics_server(listen_addr: SocketAddr) -> Result<(), MetricsError> {
    if EXPORTER_INSTALLED.swap(true, Ordering::SeqCst) {
        return Err(MetricsError::AlreadyInitialized);
    }

    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install()
        .map_err(|e| {
            EXPORTER_INSTALLED.store(false, Ordering::SeqCst);
            MetricsError::SetupFailed(e.to_string())
        })?;

    init_metrics();
    tracing::info!(%listen_addr, "metrics exporter listening");
    Ok(())
}
