//! SourceRecord - producer input
//!
//! A record handed to the dispatcher together with the callback that reports
//! its final outcome back to the message source.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Why a record could not be delivered
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// Entry can never fit into a single request, not retried
    #[error("entry of {size} bytes exceeds the request ceiling of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    /// Every attempt up to the retry limit failed
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    /// Dispatcher stopped before the record reached a terminal outcome
    #[error("dispatcher shut down before the record was delivered")]
    Shutdown,

    /// Completion handle dropped without an outcome
    #[error("record dropped without an outcome")]
    Abandoned,
}

/// Outcome callback supplied by the message source
///
/// Implementations must be cheap and non-blocking; they run on dispatcher tasks.
pub trait RecordCompletion: Send + Sync {
    /// Record was accepted by the remote endpoint
    fn on_success(&self);

    /// Record permanently failed
    fn on_failure(&self, reason: &FailureReason);
}

/// Move-only completion handle
///
/// `succeed` and `fail` consume the handle, so at most one outcome can be
/// reported. Dropping an unresolved handle reports `FailureReason::Abandoned`.
pub struct Completion {
    inner: Option<Arc<dyn RecordCompletion>>,
}

impl Completion {
    /// Wrap a completion callback
    pub fn new(inner: Arc<dyn RecordCompletion>) -> Self {
        Self { inner: Some(inner) }
    }

    /// Report success
    pub fn succeed(mut self) {
        if let Some(inner) = self.inner.take() {
            inner.on_success();
        }
    }

    /// Report permanent failure
    pub fn fail(mut self, reason: FailureReason) {
        if let Some(inner) = self.inner.take() {
            inner.on_failure(&reason);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.on_failure(&FailureReason::Abandoned);
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("resolved", &self.inner.is_none())
            .finish()
    }
}

/// A record from the message source
#[derive(Debug)]
pub struct SourceRecord {
    /// Originating topic, used as the entry's detail type
    topic: String,
    /// Message metadata (message_id, event_time, ...)
    metadata: BTreeMap<String, String>,
    completion: Completion,
}

impl SourceRecord {
    /// Create a record for `topic` reporting to `completion`
    pub fn new(topic: impl Into<String>, completion: Arc<dyn RecordCompletion>) -> Self {
        Self {
            topic: topic.into(),
            metadata: BTreeMap::new(),
            completion: Completion::new(completion),
        }
    }

    /// Attach a metadata field
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Originating topic
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// All metadata carried by the record
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Split into topic, metadata and completion handle
    pub fn into_parts(self) -> (String, BTreeMap<String, String>, Completion) {
        (self.topic, self.metadata, self.completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        acked: AtomicUsize,
        failures: Mutex<Vec<FailureReason>>,
    }

    impl RecordCompletion for Recorder {
        fn on_success(&self) {
            self.acked.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failure(&self, reason: &FailureReason) {
            self.failures.lock().unwrap().push(reason.clone());
        }
    }

    #[test]
    fn test_completion_succeed_once() {
        let recorder = Arc::new(Recorder::default());
        Completion::new(recorder.clone()).succeed();
        assert_eq!(recorder.acked.load(Ordering::SeqCst), 1);
        assert!(recorder.failures.lock().unwrap().is_empty());
    }

    #[test]
    fn test_completion_fail_reports_reason() {
        let recorder = Arc::new(Recorder::default());
        Completion::new(recorder.clone()).fail(FailureReason::Shutdown);
        assert_eq!(recorder.acked.load(Ordering::SeqCst), 0);
        assert_eq!(
            *recorder.failures.lock().unwrap(),
            vec![FailureReason::Shutdown]
        );
    }

    #[test]
    fn test_dropped_completion_is_abandoned() {
        let recorder = Arc::new(Recorder::default());
        let record = SourceRecord::new("topic", recorder.clone());
        drop(record);
        assert_eq!(
            *recorder.failures.lock().unwrap(),
            vec![FailureReason::Abandoned]
        );
    }

    #[test]
    fn test_record_parts() {
        let recorder = Arc::new(Recorder::default());
        let record = SourceRecord::new("orders", recorder.clone())
            .with_metadata("message_id", "1:2:3")
            .with_metadata("event_time", "1700000000000");
        assert_eq!(record.topic(), "orders");
        assert_eq!(record.metadata().len(), 2);

        let (topic, metadata, completion) = record.into_parts();
        assert_eq!(topic, "orders");
        assert_eq!(metadata["message_id"], "1:2:3");
        completion.succeed();
        assert_eq!(recorder.acked.load(Ordering::SeqCst), 1);
    }
}
