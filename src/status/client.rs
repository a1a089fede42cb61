//! Timeline notifications.
//!
//! The reference timeline service speaks gRPC (`SendTimelineUpdate`);
//! reaching it from here needs an HTTP gateway exposing `POST /timeline`.

use crate::routing::client::normalize_base_url;
use crate::status::error::{StatusError, StatusResult};
use crate::transfer::{timestamp_now, TransferStatus};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// One timeline event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub transfer_id: String,
    pub hostname: String,
    pub timestamp: String,
    pub status: TransferStatus,
}

impl StatusUpdate {
    pub fn new(
        transfer_id: impl Into<String>,
        hostname: impl Into<String>,
        status: TransferStatus,
    ) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            hostname: hostname.into(),
            timestamp: timestamp_now(),
            status,
        }
    }
}

/// Sink for transfer status events.
///
/// Failures never affect a transfer's outcome; callers log and move on.
pub trait StatusReporter: Send + Sync {
    fn report(&self, update: StatusUpdate) -> impl Future<Output = StatusResult<()>> + Send;
}

/// HTTP client for the timeline service
#[derive(Debug, Clone)]
pub struct HttpStatusClient {
    url: String,
    client: reqwest::Client,
}

impl HttpStatusClient {
    pub fn new(base_url: &str, timeout: Duration) -> StatusResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StatusError::Unreachable(e.to_string()))?;

        Ok(Self {
            url: format!("{}/timeline", normalize_base_url(base_url)),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl StatusReporter for HttpStatusClient {
    async fn report(&self, update: StatusUpdate) -> StatusResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&update)
            .send()
            .await
            .map_err(|e| StatusError::Unreachable(format!("{}: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StatusError::Rejected(format!("{} returned {status}", self.url)));
        }

        tracing::debug!(
            transfer_id = %update.transfer_id,
            status = %update.status,
            "timeline update sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_wire_shape() {
        let update = StatusUpdate::new("t-1", "relay-b", TransferStatus::Done);
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["transfer_id"], "t-1");
        assert_eq!(json["hostname"], "relay-b");
        assert_eq!(json["status"], "DONE");
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_url_normalization() {
        let client = HttpStatusClient::new("localhost:50053", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url(), "http://localhost:50053/timeline");

        let client =
            HttpStatusClient::new("http://timeline:50053/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url(), "http://timeline:50053/timeline");
    }
}
