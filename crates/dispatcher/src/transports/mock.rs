//! MockTransport - scripted responses with call recording

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use contracts::{
    BatchTransport, ContractError, PutEntry, PutResponse, PutResultEntry, MAX_REQUEST_BYTES,
};
use tracing::debug;

type Handler = dyn Fn(usize, &[PutEntry]) -> Result<PutResponse, ContractError> + Send + Sync;

/// Transport whose responses come from a closure
///
/// The closure receives the zero-based call index and the request entries.
/// Clones share the recorded calls.
#[derive(Clone)]
pub struct MockTransport {
    name: String,
    handler: Arc<Handler>,
    requests: Arc<Mutex<Vec<Vec<PutEntry>>>>,
    delay: Option<Duration>,
    max_request_bytes: usize,
}

impl MockTransport {
    /// Create a mock answering with `handler`
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(usize, &[PutEntry]) -> Result<PutResponse, ContractError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
            requests: Arc::new(Mutex::new(Vec::new())),
            delay: None,
            max_request_bytes: MAX_REQUEST_BYTES,
        }
    }

    /// Mock that accepts every entry
    pub fn accept_all(name: impl Into<String>) -> Self {
        Self::new(name, |call, entries| {
            Ok(PutResponse::from_entries(
                (0..entries.len())
                    .map(|i| PutResultEntry::ok(format!("{call}-{i}")))
                    .collect(),
            ))
        })
    }

    /// Mock that fails every `n`-th entry (by position across all calls)
    pub fn fail_every(name: impl Into<String>, n: usize) -> Self {
        let n = n.max(1);
        let seen = Arc::new(Mutex::new(0usize));
        Self::new(name, move |call, entries| {
            let mut seen = seen
                .lock()
                .map_err(|_| ContractError::Other("mock counter poisoned".into()))?;
            let results = entries
                .iter()
                .enumerate()
                .map(|(i, _)| {
                    *seen += 1;
                    if (*seen).is_multiple_of(n) {
                        PutResultEntry::failed("InternalFailure", "injected failure")
                    } else {
                        PutResultEntry::ok(format!("{call}-{i}"))
                    }
                })
                .collect();
            Ok(PutResponse::from_entries(results))
        })
    }

    /// Delay every call by `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Override the request ceiling
    pub fn with_max_request_bytes(mut self, max: usize) -> Self {
        self.max_request_bytes = max;
        self
    }

    /// Number of calls received
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Entries of every call, in call order
    pub fn requests(&self) -> Vec<Vec<PutEntry>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("name", &self.name)
            .field("calls", &self.call_count())
            .field("delay", &self.delay)
            .finish()
    }
}

impl BatchTransport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_request_bytes(&self) -> usize {
        self.max_request_bytes
    }

    async fn put_events(&self, entries: &[PutEntry]) -> Result<PutResponse, ContractError> {
        let call = {
            let mut requests = self
                .requests
                .lock()
                .map_err(|_| ContractError::transport(&self.name, "request log poisoned"))?;
            requests.push(entries.to_vec());
            requests.len() - 1
        };
        debug!(transport = %self.name, call, entries = entries.len(), "Mock call");

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(call, entries)
    }
}
