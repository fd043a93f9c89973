//! Run statistics and record outcome tracking.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use contracts::{FailureReason, RecordCompletion};
use dispatcher::MetricsSnapshot;

/// Counts record outcomes reported by the dispatcher
#[derive(Debug, Default)]
pub struct OutcomeTracker {
    succeeded: AtomicU64,
    failed: AtomicU64,
    reasons: Mutex<BTreeMap<&'static str, u64>>,
}

impl OutcomeTracker {
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Failure counts by reason
    pub fn reasons(&self) -> BTreeMap<&'static str, u64> {
        self.reasons
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl RecordCompletion for OutcomeTracker {
    fn on_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    fn on_failure(&self, reason: &FailureReason) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        let label = match reason {
            FailureReason::MessageTooLarge { .. } => "message_too_large",
            FailureReason::RetryExhausted { .. } => "retry_exhausted",
            FailureReason::Shutdown => "shutdown",
            FailureReason::Abandoned => "abandoned",
        };
        if let Ok(mut reasons) = self.reasons.lock() {
            *reasons.entry(label).or_default() += 1;
        }
    }
}

/// Statistics from a sink run
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Lines read from the input
    pub records_read: u64,

    /// Records delivered
    pub succeeded: u64,

    /// Records permanently failed
    pub failed: u64,

    /// Failure counts by reason
    pub failure_reasons: BTreeMap<&'static str, u64>,

    /// Dispatcher counters at shutdown
    pub dispatcher: MetricsSnapshot,

    /// Total duration of the run
    pub duration: Duration,
}

impl RunStats {
    /// Collect final statistics
    pub fn collect(
        records_read: u64,
        tracker: &OutcomeTracker,
        dispatcher: MetricsSnapshot,
        duration: Duration,
    ) -> Self {
        Self {
            records_read,
            succeeded: tracker.succeeded(),
            failed: tracker.failed(),
            failure_reasons: tracker.reasons(),
            dispatcher,
            duration,
        }
    }

    /// Delivered records per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.succeeded as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Batch Sink Statistics ===\n");

        println!("Overview");
        println!("   Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   Records read: {}", self.records_read);
        println!("   Succeeded: {}", self.succeeded);
        println!("   Failed: {}", self.failed);
        println!("   Throughput: {:.2} records/s", self.throughput());

        println!("\nDispatcher");
        println!("   Batches flushed: {}", self.dispatcher.batches_flushed);
        println!("   Transport calls: {}", self.dispatcher.put_calls);
        println!("   Retries: {}", self.dispatcher.retries);
        println!("   Rejected on append: {}", self.dispatcher.rejected);

        if !self.failure_reasons.is_empty() {
            println!("\nFailure Reasons");
            for (reason, count) in &self.failure_reasons {
                println!("   {}: {}", reason, count);
            }
        }

        println!();
    }
}
