//! Prometheus Metrics Module
//!
//! Exposes relay metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Log**: Messages consumed and skipped from the upstream topic
//! - **Fan-out**: Frames enqueued and written, fan-out latency
//! - **Subscribers**: Open connections and disconnects by reason
//! - **Pipeline**: Ingested rows by outcome, RSI readings published
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.
//! Recording before [`init_metrics`] is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::subscription::DisconnectReason;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Later calls return the handle installed by the first.
///
/// # Errors
///
/// Returns `BuildError` if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Log counters
    describe_counter!(
        "trade_relay_messages_consumed_total",
        "Total messages consumed from the upstream topic"
    );
    describe_counter!(
        "trade_relay_messages_skipped_total",
        "Total consumed messages without a deliverable payload"
    );

    // Fan-out
    describe_counter!(
        "trade_relay_frames_enqueued_total",
        "Total frames accepted onto subscriber queues"
    );
    describe_counter!(
        "trade_relay_frames_sent_total",
        "Total frames written to subscriber connections"
    );
    describe_histogram!(
        "trade_relay_fanout_seconds",
        "Time to fan one message out to all subscribers"
    );

    // Subscribers
    describe_gauge!(
        "trade_relay_open_subscribers",
        "Number of open subscriber connections"
    );
    describe_counter!(
        "trade_relay_disconnects_total",
        "Total subscriber disconnects by reason"
    );
    describe_counter!(
        "trade_relay_delivery_failures_total",
        "Total subscribers dropped for failed delivery by reason"
    );

    // Pipeline
    describe_counter!(
        "trade_relay_ingest_rows_total",
        "Total CSV rows processed by outcome"
    );
    describe_counter!(
        "trade_relay_rsi_published_total",
        "Total RSI readings published"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a message consumed from the log.
pub fn record_message_consumed(skipped: bool) {
    counter!("trade_relay_messages_consumed_total").increment(1);
    if skipped {
        counter!("trade_relay_messages_skipped_total").increment(1);
    }
}

/// Record one fan-out pass.
pub fn record_fanout(enqueued: usize, duration: Duration) {
    counter!("trade_relay_frames_enqueued_total").increment(enqueued as u64);
    histogram!("trade_relay_fanout_seconds").record(duration.as_secs_f64());
}

/// Record a frame written to a subscriber.
pub fn record_frame_sent() {
    counter!("trade_relay_frames_sent_total").increment(1);
}

/// Update the open subscriber count.
#[allow(clippy::cast_precision_loss)]
pub fn set_open_subscribers(count: usize) {
    gauge!("trade_relay_open_subscribers").set(count as f64);
}

/// Record a subscriber disconnect.
pub fn record_disconnect(reason: DisconnectReason) {
    counter!(
        "trade_relay_disconnects_total",
        "reason" => reason.as_str()
    )
    .increment(1);

    if reason.is_delivery_failure() {
        counter!(
            "trade_relay_delivery_failures_total",
            "reason" => reason.as_str()
        )
        .increment(1);
    }
}

/// Record one ingested CSV row.
pub fn record_ingest_row(outcome: &'static str) {
    counter!(
        "trade_relay_ingest_rows_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a published RSI reading.
pub fn record_rsi_published() {
    counter!("trade_relay_rsi_published_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================
