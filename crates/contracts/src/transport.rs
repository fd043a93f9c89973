//! BatchTransport trait - Dispatch Engine output interface
//!
//! One call ships one ordered batch of entries and returns a result per entry,
//! aligned by position with the request.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::ContractError;

/// Maximum number of entries the endpoint accepts in one request
pub const MAX_REQUEST_ENTRIES: usize = 10;

/// Maximum size of one request in bytes
pub const MAX_REQUEST_BYTES: usize = 256 * 1024;

/// Size accounted for an entry timestamp
const EVENT_TIME_BYTES: usize = 14;

/// One entry of a bulk put request
#[derive(Debug, Clone, PartialEq)]
pub struct PutEntry {
    /// Target event bus
    pub event_bus_name: String,
    /// Source label (the sink name)
    pub source: String,
    /// Detail type label (the record's group key, usually its topic)
    pub detail_type: String,
    /// Event payload
    pub detail: Bytes,
    /// Resource identities the event refers to
    pub resources: Vec<String>,
    /// Event time, stamped by the endpoint on receipt when unset
    pub time: Option<DateTime<Utc>>,
    /// Selected record metadata
    pub metadata: BTreeMap<String, String>,
}

impl PutEntry {
    /// Serialized size counted against batch and request limits
    pub fn size(&self) -> usize {
        let time = if self.time.is_some() {
            EVENT_TIME_BYTES
        } else {
            0
        };
        let resources: usize = self.resources.iter().map(String::len).sum();
        let metadata: usize = self.metadata.iter().map(|(k, v)| k.len() + v.len()).sum();

        time + self.source.len()
            + self.detail_type.len()
            + self.detail.len()
            + resources
            + metadata
    }
}

/// Result for one request entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutResultEntry {
    /// Identifier assigned by the endpoint
    pub event_id: Option<String>,
    /// Error code, set when the entry failed
    pub error_code: Option<String>,
    /// Human-readable error
    pub error_message: Option<String>,
}

impl PutResultEntry {
    /// Successful entry
    pub fn ok(event_id: impl Into<String>) -> Self {
        Self {
            event_id: Some(event_id.into()),
            ..Default::default()
        }
    }

    /// Failed entry
    pub fn failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_id: None,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
        }
    }

    /// Whether the endpoint accepted the entry
    ///
    /// The endpoint only marks failures; a result without an error code is a
    /// success even when it carries no event id.
    pub fn is_success(&self) -> bool {
        self.error_code.is_none()
    }
}

/// Response of a bulk put request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutResponse {
    /// Per-entry results, aligned with the request
    pub entries: Vec<PutResultEntry>,
    /// Number of failed entries as reported by the endpoint
    pub failed_entry_count: usize,
}

impl PutResponse {
    /// Build a response, deriving the failed count from the entries
    pub fn from_entries(entries: Vec<PutResultEntry>) -> Self {
        let failed_entry_count = entries.iter().filter(|e| !e.is_success()).count();
        Self {
            entries,
            failed_entry_count,
        }
    }
}

/// Transport trait
///
/// All transport implementations must implement this trait. Calls may run
/// concurrently for independent batches.
#[trait_variant::make(BatchTransport: Send)]
pub trait LocalBatchTransport {
    /// Transport name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Largest request the endpoint accepts; an entry above it can never be sent
    fn max_request_bytes(&self) -> usize {
        MAX_REQUEST_BYTES
    }

    /// Send entries in order
    ///
    /// # Errors
    /// Returns a transport-level error when no per-entry result is available
    async fn put_events(&self, entries: &[PutEntry]) -> Result<PutResponse, ContractError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(detail: &str) -> PutEntry {
        PutEntry {
            event_bus_name: "bus".into(),
            source: "test-sink".into(),
            detail_type: "test-topic".into(),
            detail: Bytes::copy_from_slice(detail.as_bytes()),
            resources: vec!["test-arn".into()],
            time: None,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_entry_size_counts_labels_and_detail() {
        let e = entry(r#"{"test-json": "test-value"}"#);
        // 9 + 10 + 27 + 8
        assert_eq!(e.size(), 54);
        // Ten of them stay under the default byte threshold
        assert!(10 * e.size() < 640);
    }

    #[test]
    fn test_entry_size_counts_time_and_metadata() {
        let mut e = entry("x");
        e.time = Some(Utc::now());
        e.metadata.insert("message_id".into(), "1:0".into());
        assert_eq!(e.size(), 14 + 9 + 10 + 1 + 8 + 10 + 3);
    }

    #[test]
    fn test_response_failed_count() {
        let response = PutResponse::from_entries(vec![
            PutResultEntry::ok("a"),
            PutResultEntry::failed("ThrottlingException", "slow down"),
            PutResultEntry::default(),
        ]);
        assert_eq!(response.failed_entry_count, 1);
        assert!(response.entries[2].is_success());
    }
}
