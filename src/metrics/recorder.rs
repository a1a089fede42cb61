//! Metrics recorder for relay operations
//!
//! Without an installed exporter every call is a cheap no-op.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    describe_counter!(
        "hoplink_transfers_received_total",
        "Inbound transfers whose payload was fully received"
    );
    describe_counter!(
        "hoplink_transfers_delivered_total",
        "Transfers persisted at their final destination"
    );
    describe_counter!(
        "hoplink_transfers_relayed_total",
        "Transfers forwarded successfully to the next hop"
    );
    describe_counter!(
        "hoplink_relay_failures_total",
        "Forward attempts that failed"
    );
    describe_counter!(
        "hoplink_checksum_failures_total",
        "Inbound transfers rejected for a digest mismatch"
    );
    describe_counter!(
        "hoplink_protocol_errors_total",
        "Inbound connections closed for malformed or truncated frames"
    );
    describe_counter!("hoplink_bytes_received_total", "Payload bytes received");
    describe_counter!("hoplink_bytes_sent_total", "Payload bytes sent");

    describe_gauge!(
        "hoplink_active_handlers",
        "Inbound connections currently being handled"
    );

    describe_histogram!(
        "hoplink_hop_duration_seconds",
        "Time to push one file to the next hop, including acknowledgment"
    );
}

// ============== Receive Side ==============

pub fn record_transfer_received(bytes: u64) {
    counter!("hoplink_transfers_received_total").increment(1);
    counter!("hoplink_bytes_received_total").increment(bytes);
}

pub fn record_delivered() {
    counter!("hoplink_transfers_delivered_total").increment(1);
}

pub fn record_checksum_failure() {
    counter!("hoplink_checksum_failures_total").increment(1);
}

pub fn record_protocol_error(kind: &'static str) {
    counter!("hoplink_protocol_errors_total", "kind" => kind).increment(1);
}

pub fn handler_started() {
    gauge!("hoplink_active_handlers").increment(1.0);
}

pub fn handler_finished() {
    gauge!("hoplink_active_handlers").decrement(1.0);
}

// ============== Send Side ==============

pub fn record_relayed() {
    counter!("hoplink_transfers_relayed_total").increment(1);
}

pub fn record_relay_failure(reason: &'static str) {
    counter!("hoplink_relay_failures_total", "reason" => reason).increment(1);
}

pub fn record_hop_sent(bytes: u64, duration: Duration) {
    counter!("hoplink_bytes_sent_total").increment(bytes);
    histogram!("hoplink_hop_duration_seconds").record(duration.as_secs_f64());
}

/// Times one hop and records it on success
pub struct HopTimer {
    start_time: Instant,
}

impl HopTimer {
    pub fn start() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Stop timing and record the duration with the bytes sent
    pub fn finish(self, bytes: u64) -> Duration {
        let elapsed = self.start_time.elapsed();
        record_hop_sent(bytes, elapsed);
        elapsed
    }
}
