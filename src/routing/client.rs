//! Route lookups against the path-computation service.
//!
//! The service answers a run request with a stream of newline-delimited
//! JSON events. Only the terminal `complete` event matters here; `step`
//! events are handed to an optional progress callback.
//!
//! The reference path service speaks gRPC (`RunAlgorithm`); reaching it
//! from here needs an HTTP gateway exposing `POST /algorithm/run`.

use crate::routing::error::{RoutingError, RoutingResult};
use crate::routing::types::{Algorithm, RouteEvent, RouteRequest};
use crate::transfer::Route;
use std::future::Future;
use std::time::Duration;

/// Source of routes between nodes
pub trait RouteProvider: Send + Sync {
    /// Ask for a route. Fails with [`RoutingError::NoRoute`] when the
    /// service completes without a path. No retry is performed.
    fn find_route(
        &self,
        source: &str,
        destination: &str,
        algorithm: Algorithm,
        on_step: &mut (dyn FnMut(&serde_json::Value) + Send),
    ) -> impl Future<Output = RoutingResult<Route>> + Send;
}

/// HTTP client for the routing service
#[derive(Debug, Clone)]
pub struct HttpRouteClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRouteClient {
    pub fn new(base_url: &str, connect_timeout: Duration) -> RoutingResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| RoutingError::Unavailable(e.to_string()))?;

        Ok(Self {
            base_url: normalize_base_url(base_url),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn run_url(&self) -> String {
        format!("{}/algorithm/run", self.base_url)
    }
}

impl RouteProvider for HttpRouteClient {
    async fn find_route(
        &self,
        source: &str,
        destination: &str,
        algorithm: Algorithm,
        on_step: &mut (dyn FnMut(&serde_json::Value) + Send),
    ) -> RoutingResult<Route> {
        let url = self.run_url();
        let request = RouteRequest {
            algo: algorithm,
            src: source.to_string(),
            dst: destination.to_string(),
        };

        tracing::debug!(%url, %source, %destination, %algorithm, "requesting route");

        let mut response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RoutingError::Unavailable(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RoutingError::Unavailable(format!("{url} returned {status}")));
        }

        let mut lines = LineBuffer::default();
        loop {
            let chunk = response
                .chunk()
                .await
                .map_err(|e| RoutingError::Unavailable(format!("event stream: {e}")))?;

            let Some(chunk) = chunk else { break };
            for line in lines.push(&chunk) {
                if let Some(path) = handle_event(&line, on_step)? {
                    return finish(path, source, destination);
                }
            }
        }

        if let Some(line) = lines.finish() {
            if let Some(path) = handle_event(&line, on_step)? {
                return finish(path, source, destination);
            }
        }

        Err(RoutingError::Unavailable(
            "route stream ended without a complete event".into(),
        ))
    }
}

/// Accept `host:port` as well as full URLs
pub(crate) fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

/// Returns the path once a complete event is seen
fn handle_event(
    line: &str,
    on_step: &mut (dyn FnMut(&serde_json::Value) + Send),
) -> RoutingResult<Option<Vec<String>>> {
    let event: RouteEvent =
        serde_json::from_str(line).map_err(|e| RoutingError::Protocol(e.to_string()))?;

    if let Some(step) = &event.step {
        on_step(step);
    }
    Ok(event.completed_path().map(<[String]>::to_vec))
}

fn finish(path: Vec<String>, source: &str, destination: &str) -> RoutingResult<Route> {
    if path.is_empty() {
        return Err(RoutingError::NoRoute {
            origin: source.to_string(),
            destination: destination.to_string(),
        });
    }
    Ok(Route::new(path))
}

/// Splits a byte stream into trimmed, non-empty lines
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        (!text.is_empty()).then_some(text)
    }
}
