//! Dispatcher counters for reporting

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters for a single dispatcher
///
/// Shared between the producer handles, the worker and dispatch tasks.
#[derive(Debug, Default)]
pub struct DispatcherMetrics {
    /// Records accepted into the pending queue
    appended: AtomicU64,
    /// Records rejected by `append`
    rejected: AtomicU64,
    /// Batches handed to the dispatch engine
    batches_flushed: AtomicU64,
    /// Transport calls, retries included
    put_calls: AtomicU64,
    /// Retry attempts
    retries: AtomicU64,
    /// Records reported successful
    succeeded: AtomicU64,
    /// Records reported permanently failed after acceptance
    failed: AtomicU64,
    /// Batches currently being dispatched
    in_flight_batches: AtomicUsize,
}

impl DispatcherMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }

    pub fn inc_appended(&self) {
        self.appended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed.load(Ordering::Relaxed)
    }

    pub fn inc_batches_flushed(&self) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn put_calls(&self) -> u64 {
        self.put_calls.load(Ordering::Relaxed)
    }

    pub fn inc_put_calls(&self) {
        self.put_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn add_succeeded(&self, count: usize) {
        self.succeeded.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn add_failed(&self, count: usize) {
        self.failed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn in_flight_batches(&self) -> usize {
        self.in_flight_batches.load(Ordering::Relaxed)
    }

    pub fn set_in_flight_batches(&self, count: usize) {
        self.in_flight_batches.store(count, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            appended: self.appended(),
            rejected: self.rejected(),
            batches_flushed: self.batches_flushed(),
            put_calls: self.put_calls(),
            retries: self.retries(),
            succeeded: self.succeeded(),
            failed: self.failed(),
            in_flight_batches: self.in_flight_batches(),
        }
    }
}

/// Snapshot of dispatcher metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub appended: u64,
    pub rejected: u64,
    pub batches_flushed: u64,
    pub put_calls: u64,
    pub retries: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub in_flight_batches: usize,
}

impl MetricsSnapshot {
    /// Accepted records without a terminal outcome yet
    pub fn unresolved(&self) -> u64 {
        self.appended
            .saturating_sub(self.succeeded)
            .saturating_sub(self.failed)
    }
}
