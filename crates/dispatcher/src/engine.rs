//! DispatchEngine - sends sealed batches and retries the failed subset

use std::future;
use std::sync::Arc;
use std::time::Instant;

use contracts::{BatchTransport, FailureReason, PutEntry, PutResponse, RetryPolicy};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::accumulator::Batch;
use crate::envelope::RecordEnvelope;
use crate::metrics::DispatcherMetrics;

/// Terminal result of one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Entries reported successful
    pub succeeded: usize,
    /// Entries reported permanently failed
    pub failed: usize,
    /// Transport calls made
    pub attempts: u32,
}

/// Sends batches through a transport and drives the retry loop
///
/// Holds no batch state between calls, so one engine serves any number of
/// concurrent dispatches.
pub struct DispatchEngine<T> {
    name: String,
    transport: Arc<T>,
    policy: RetryPolicy,
    metrics: Arc<DispatcherMetrics>,
    abort: watch::Receiver<bool>,
}

impl<T: BatchTransport + Sync> DispatchEngine<T> {
    /// Create an engine; flipping `abort` to `true` fails every pending entry
    pub fn new(
        name: impl Into<String>,
        transport: Arc<T>,
        policy: RetryPolicy,
        metrics: Arc<DispatcherMetrics>,
        abort: watch::Receiver<bool>,
    ) -> Self {
        Self {
            name: name.into(),
            transport,
            policy,
            metrics,
            abort,
        }
    }

    /// Retry policy in use
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Deliver a batch, invoking exactly one callback per entry
    #[instrument(
        name = "dispatch_engine_dispatch",
        skip(self, batch),
        fields(
            dispatcher = %self.name,
            transport = %self.transport.name(),
            entries = batch.len(),
            trigger = batch.trigger().as_str()
        )
    )]
    pub async fn dispatch(&self, batch: Batch) -> DispatchOutcome {
        let mut pending = batch.into_entries();
        let mut outcome = DispatchOutcome::default();
        let mut attempt: u32 = 1;

        loop {
            let entries: Vec<PutEntry> = pending.iter().map(|e| e.entry().clone()).collect();
            let started = Instant::now();

            let result = tokio::select! {
                biased;
                _ = aborted(self.abort.clone()) => {
                    self.fail_all(pending, FailureReason::Shutdown, &mut outcome);
                    return outcome;
                }
                result = self.transport.put_events(&entries) => result,
            };
            outcome.attempts = attempt;
            self.metrics.inc_put_calls();
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            let last_error = match result {
                Ok(response) => {
                    let (failed, last_error) = split_response(pending, response);
                    let delivered = entries.len() - failed.len();
                    observability::record_put_events(
                        self.transport.name(),
                        entries.len(),
                        failed.len(),
                        latency_ms,
                    );
                    outcome.succeeded += delivered;
                    self.metrics.add_succeeded(delivered);
                    observability::record_records_completed(&self.name, true, delivered);

                    pending = failed;
                    match last_error {
                        Some(error) => error,
                        None => break,
                    }
                }
                Err(e) => {
                    observability::record_transport_error(self.transport.name());
                    warn!(
                        dispatcher = %self.name,
                        attempt,
                        error = %e,
                        "Transport call failed"
                    );
                    e.to_string()
                }
            };

            if attempt > self.policy.max_retry_count {
                warn!(
                    dispatcher = %self.name,
                    attempts = attempt,
                    remaining = pending.len(),
                    error = %last_error,
                    "Retries exhausted"
                );
                let reason = FailureReason::RetryExhausted {
                    attempts: attempt,
                    last_error,
                };
                self.fail_all(pending, reason, &mut outcome);
                return outcome;
            }

            debug!(
                dispatcher = %self.name,
                attempt,
                remaining = pending.len(),
                delay_ms = self.policy.interval.as_millis() as u64,
                "Retrying failed entries"
            );
            tokio::select! {
                biased;
                _ = aborted(self.abort.clone()) => {
                    self.fail_all(pending, FailureReason::Shutdown, &mut outcome);
                    return outcome;
                }
                _ = tokio::time::sleep(self.policy.interval) => {}
            }

            attempt += 1;
            self.metrics.inc_retries();
            observability::record_retry(self.transport.name(), attempt, pending.len());
        }

        if attempt > 1 {
            info!(
                dispatcher = %self.name,
                attempts = attempt,
                succeeded = outcome.succeeded,
                "Batch delivered after retries"
            );
        }
        outcome
    }

    fn fail_all(
        &self,
        pending: Vec<RecordEnvelope>,
        reason: FailureReason,
        outcome: &mut DispatchOutcome,
    ) {
        let count = pending.len();
        for envelope in pending {
            envelope.fail(reason.clone());
        }
        outcome.failed += count;
        self.metrics.add_failed(count);
        observability::record_records_completed(&self.name, false, count);
    }
}

/// Resolve successful entries, returning the failed ones and their last error
///
/// Entries without an aligned result count as failed.
fn split_response(
    pending: Vec<RecordEnvelope>,
    response: PutResponse,
) -> (Vec<RecordEnvelope>, Option<String>) {
    let PutResponse {
        entries: results,
        failed_entry_count,
    } = response;

    if results.len() != pending.len() {
        warn!(
            requested = pending.len(),
            results = results.len(),
            "Response not aligned with request"
        );
    }

    let mut failed = Vec::new();
    let mut last_error = None;
    let mut results = results.into_iter();

    for envelope in pending {
        match results.next() {
            Some(result) if result.is_success() => envelope.succeed(),
            Some(result) => {
                last_error = Some(format!(
                    "{}: {}",
                    result.error_code.unwrap_or_default(),
                    result.error_message.unwrap_or_default()
                ));
                failed.push(envelope);
            }
            None => {
                last_error = Some("missing result entry".to_string());
                failed.push(envelope);
            }
        }
    }

    if failed_entry_count != failed.len() {
        warn!(
            reported = failed_entry_count,
            observed = failed.len(),
            "Failed entry count disagrees with entry results"
        );
    }

    (failed, last_error)
}

/// Resolves once the abort flag is raised; never if the sender is gone first
async fn aborted(mut abort: watch::Receiver<bool>) {
    let raised = abort.wait_for(|abort| *abort).await.is_ok();
    if !raised {
        future::pending::<()>().await;
    }
}
