//! BatchSinkConfig - sink options shared by the loader, dispatcher and CLI.
//!
//! Option names follow the connector's camelCase convention. Thresholds use
//! signed integers because a non-positive value disables a trigger.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use crate::{MAX_REQUEST_BYTES, MAX_REQUEST_ENTRIES};

/// Default maximum entry count per batch
pub const DEFAULT_BATCH_MAX_SIZE: i64 = MAX_REQUEST_ENTRIES as i64;
/// Default maximum cumulative entry bytes per batch
pub const DEFAULT_MAX_BATCH_BYTES_SIZE: i64 = 640;
/// Default maximum batch age in milliseconds
pub const DEFAULT_BATCH_MAX_TIME_MS: i64 = 5000;
/// Default retry limit
pub const DEFAULT_MAX_RETRY_COUNT: i64 = 100;
/// Default delay between retries in milliseconds
pub const DEFAULT_INTERVAL_RETRY_TIME_MS: i64 = 1000;
/// Default bound on unacknowledged records
pub const DEFAULT_BATCH_PENDING_QUEUE_SIZE: i64 = 1000;

/// Metadata keys a record may propagate into its entry
pub const SUPPORTED_META_DATA_FIELDS: &[&str] = &[
    "schema_version",
    "partition",
    "event_time",
    "publish_time",
    "message_id",
    "sequence_id",
    "producer_name",
    "key",
    "properties",
];

/// Sink configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BatchSinkConfig {
    /// Target event bus name
    #[serde(default)]
    #[validate(length(min = 1, message = "eventBusName is required"))]
    pub event_bus_name: String,

    /// Endpoint region
    #[serde(default)]
    #[validate(length(min = 1, message = "region is required"))]
    pub region: String,

    /// Access key credential
    #[serde(default)]
    #[validate(length(min = 1, message = "accessKeyId is required"))]
    pub access_key_id: String,

    /// Secret key credential
    #[serde(default)]
    #[validate(length(min = 1, message = "secretAccessKey is required"))]
    pub secret_access_key: String,

    /// Resource identity of the event bus
    #[serde(default)]
    #[validate(length(min = 1, message = "eventBusResourceName is required"))]
    pub event_bus_resource_name: String,

    /// Role to assume (pass-through)
    #[serde(default)]
    pub role: String,

    /// Session name for the assumed role (pass-through)
    #[serde(default)]
    pub role_session_name: String,

    /// Token service endpoint override (pass-through)
    #[serde(default)]
    pub sts_endpoint: String,

    /// Endpoint override (pass-through)
    #[serde(default)]
    pub aws_endpoint: String,

    /// Max entries per batch, non-positive disables the count trigger
    #[serde(default = "default_batch_max_size")]
    pub batch_max_size: i64,

    /// Max cumulative entry bytes per batch
    #[serde(default = "default_batch_max_bytes_size")]
    #[validate(range(
        min = 1,
        max = 262144,
        message = "batchMaxBytesSize must be within (0, 256KiB]"
    ))]
    pub batch_max_bytes_size: i64,

    /// Max batch age in ms, non-positive disables the time trigger
    #[serde(default = "default_batch_max_time_ms")]
    pub batch_max_time_ms: i64,

    /// Retries after the first attempt
    #[serde(default = "default_max_retry_count")]
    #[validate(range(min = 0, message = "maxRetryCount must be >= 0"))]
    pub max_retry_count: i64,

    /// Delay between attempts in ms
    #[serde(default = "default_interval_retry_time_ms")]
    #[validate(range(min = 0, message = "intervalRetryTimeMs must be >= 0"))]
    pub interval_retry_time_ms: i64,

    /// Bound on accepted but unacknowledged records
    #[serde(default = "default_batch_pending_queue_size")]
    #[validate(range(min = 1, message = "batchPendingQueueSize must be > 0"))]
    pub batch_pending_queue_size: i64,

    /// Metadata keys propagated per entry
    #[serde(
        default = "default_meta_data_fields",
        deserialize_with = "deserialize_field_set"
    )]
    pub meta_data_fields: BTreeSet<String>,
}

fn default_batch_max_size() -> i64 {
    DEFAULT_BATCH_MAX_SIZE
}

fn default_batch_max_bytes_size() -> i64 {
    DEFAULT_MAX_BATCH_BYTES_SIZE
}

fn default_batch_max_time_ms() -> i64 {
    DEFAULT_BATCH_MAX_TIME_MS
}

fn default_max_retry_count() -> i64 {
    DEFAULT_MAX_RETRY_COUNT
}

fn default_interval_retry_time_ms() -> i64 {
    DEFAULT_INTERVAL_RETRY_TIME_MS
}

fn default_batch_pending_queue_size() -> i64 {
    DEFAULT_BATCH_PENDING_QUEUE_SIZE
}

fn default_meta_data_fields() -> BTreeSet<String> {
    ["event_time", "message_id"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Accepts either `"a,b"` or `["a", "b"]`
fn deserialize_field_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FieldList {
        Csv(String),
        List(Vec<String>),
    }

    let fields = match FieldList::deserialize(deserializer)? {
        FieldList::Csv(csv) => csv.split(',').map(str::to_string).collect::<Vec<_>>(),
        FieldList::List(list) => list,
    };

    Ok(fields
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect())
}

impl BatchSinkConfig {
    /// Create a config with the required identity fields and defaults elsewhere
    pub fn new(
        event_bus_name: impl Into<String>,
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        event_bus_resource_name: impl Into<String>,
    ) -> Self {
        Self {
            event_bus_name: event_bus_name.into(),
            region: region.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            event_bus_resource_name: event_bus_resource_name.into(),
            role: String::new(),
            role_session_name: String::new(),
            sts_endpoint: String::new(),
            aws_endpoint: String::new(),
            batch_max_size: DEFAULT_BATCH_MAX_SIZE,
            batch_max_bytes_size: DEFAULT_MAX_BATCH_BYTES_SIZE,
            batch_max_time_ms: DEFAULT_BATCH_MAX_TIME_MS,
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            interval_retry_time_ms: DEFAULT_INTERVAL_RETRY_TIME_MS,
            batch_pending_queue_size: DEFAULT_BATCH_PENDING_QUEUE_SIZE,
            meta_data_fields: default_meta_data_fields(),
        }
    }

    /// Entry count trigger, `None` when disabled
    pub fn max_entries(&self) -> Option<usize> {
        (self.batch_max_size > 0).then_some(self.batch_max_size as usize)
    }

    /// Byte trigger
    pub fn max_bytes(&self) -> usize {
        (self.batch_max_bytes_size.max(1) as usize).min(MAX_REQUEST_BYTES)
    }

    /// Largest single entry accepted by `append`
    ///
    /// An entry may overshoot a small `batchMaxBytesSize` and ship alone, but
    /// never the larger of that threshold and the default batch size. The
    /// transport's request limit caps the result.
    pub fn max_message_bytes(&self, request_ceiling: usize) -> usize {
        self.max_bytes()
            .max(DEFAULT_MAX_BATCH_BYTES_SIZE as usize)
            .min(request_ceiling)
    }

    /// Age trigger, `None` when disabled
    pub fn max_age(&self) -> Option<Duration> {
        (self.batch_max_time_ms > 0).then(|| Duration::from_millis(self.batch_max_time_ms as u64))
    }

    /// Bound on unacknowledged records
    pub fn pending_queue_size(&self) -> usize {
        self.batch_pending_queue_size.max(1) as usize
    }

    /// Retry policy derived from the config
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            u32::try_from(self.max_retry_count.max(0)).unwrap_or(u32::MAX),
            Duration::from_millis(self.interval_retry_time_ms.max(0) as u64),
        )
    }
}

/// Retry tuning for the dispatch engine
///
/// Kept separate from `BatchSinkConfig` so a dispatcher can run with its own
/// policy without touching the shared config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retry_count: u32,
    /// Delay between attempts
    pub interval: Duration,
}

impl RetryPolicy {
    /// Create a retry policy
    pub fn new(max_retry_count: u32, interval: Duration) -> Self {
        Self {
            max_retry_count,
            interval,
        }
    }

    /// Total sends a failing entry receives
    pub fn max_attempts(&self) -> u32 {
        self.max_retry_count.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RETRY_COUNT as u32,
            Duration::from_millis(DEFAULT_INTERVAL_RETRY_TIME_MS as u64),
        )
    }
}
