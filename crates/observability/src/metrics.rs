//! Batch dispatch metrics
//!
//! Thin wrappers over the `metrics` facade so every crate records the same
//! names and labels. Without an installed recorder these calls are no-ops.

use metrics::{counter, gauge, histogram};

/// Record a sealed batch handed to the dispatch engine
///
/// `trigger` is one of `count`, `bytes`, `time`, `manual`, `shutdown`.
pub fn record_batch_flushed(dispatcher: &str, trigger: &'static str, entries: usize, bytes: usize) {
    counter!(
        "batch_sink_batches_flushed_total",
        "dispatcher" => dispatcher.to_string(),
        "trigger" => trigger
    )
    .increment(1);

    histogram!("batch_sink_batch_entries", "dispatcher" => dispatcher.to_string())
        .record(entries as f64);
    histogram!("batch_sink_batch_bytes", "dispatcher" => dispatcher.to_string())
        .record(bytes as f64);
}

/// Record one transport call and how many of its entries failed
pub fn record_put_events(transport: &str, entries: usize, failed: usize, latency_ms: f64) {
    counter!("batch_sink_put_events_total", "transport" => transport.to_string()).increment(1);
    counter!("batch_sink_entries_sent_total", "transport" => transport.to_string())
        .increment(entries as u64);

    if failed > 0 {
        counter!("batch_sink_entries_failed_attempts_total", "transport" => transport.to_string())
            .increment(failed as u64);
    }

    histogram!("batch_sink_put_events_latency_ms", "transport" => transport.to_string())
        .record(latency_ms);
}

/// Record a transport-level error (whole attempt failed)
pub fn record_transport_error(transport: &str) {
    counter!("batch_sink_transport_errors_total", "transport" => transport.to_string())
        .increment(1);
}

/// Record a retry of the still-failing subset of a batch
pub fn record_retry(transport: &str, attempt: u32, entries: usize) {
    counter!("batch_sink_retries_total", "transport" => transport.to_string()).increment(1);
    gauge!("batch_sink_last_retry_attempt", "transport" => transport.to_string())
        .set(attempt as f64);
    counter!("batch_sink_entries_retried_total", "transport" => transport.to_string())
        .increment(entries as u64);
}

/// Record terminal record outcomes
pub fn record_records_completed(dispatcher: &str, success: bool, count: usize) {
    if count == 0 {
        return;
    }
    let status = if success { "success" } else { "failure" };
    counter!(
        "batch_sink_records_completed_total",
        "dispatcher" => dispatcher.to_string(),
        "status" => status
    )
    .increment(count as u64);
}

/// Record a record rejected before batching because it can never fit a request
pub fn record_message_too_large(dispatcher: &str) {
    counter!(
        "batch_sink_records_too_large_total",
        "dispatcher" => dispatcher.to_string()
    )
    .increment(1);
}

/// Record the number of accepted but unacknowledged records
pub fn record_pending_records(dispatcher: &str, pending: usize) {
    gauge!(
        "batch_sink_pending_records",
        "dispatcher" => dispatcher.to_string()
    )
    .set(pending as f64);
}
