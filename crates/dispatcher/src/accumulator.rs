//! BatchAccumulator - collects envelopes into the open batch
//!
//! The accumulator is plain state owned by the dispatcher worker. It never
//! blocks and never talks to the transport; it only decides when the open
//! batch must be sealed.

use std::mem;
use std::time::Duration;

use contracts::BatchSinkConfig;
use tokio::time::Instant;

use crate::envelope::RecordEnvelope;

/// Why a batch was sealed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// Entry count reached `batchMaxSize`
    Count,
    /// Accumulated bytes reached `batchMaxBytesSize`
    Bytes,
    /// Batch age reached `batchMaxTimeMs`
    Time,
    /// Explicit flush request
    Manual,
    /// Dispatcher shutdown
    Shutdown,
}

impl FlushTrigger {
    /// Metric/log label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Bytes => "bytes",
            Self::Time => "time",
            Self::Manual => "manual",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Flush thresholds, each evaluated independently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// Count trigger, `None` when disabled
    pub max_entries: Option<usize>,
    /// Byte trigger
    pub max_bytes: usize,
    /// Age trigger, `None` when disabled
    pub max_age: Option<Duration>,
}

impl BatchLimits {
    /// Limits derived from a validated config
    pub fn from_config(config: &BatchSinkConfig) -> Self {
        Self {
            max_entries: config.max_entries(),
            max_bytes: config.max_bytes(),
            max_age: config.max_age(),
        }
    }
}

/// A sealed batch, ready for dispatch
#[derive(Debug)]
pub struct Batch {
    entries: Vec<RecordEnvelope>,
    total_bytes: usize,
    created_at: Instant,
    trigger: FlushTrigger,
}

impl Batch {
    /// Envelopes in append order
    pub fn entries(&self) -> &[RecordEnvelope] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of entry sizes
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// When the first entry arrived
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Why the batch was sealed
    pub fn trigger(&self) -> FlushTrigger {
        self.trigger
    }

    /// Take ownership of the envelopes
    pub fn into_entries(self) -> Vec<RecordEnvelope> {
        self.entries
    }
}

/// Open batch plus its thresholds
#[derive(Debug)]
pub struct BatchAccumulator {
    limits: BatchLimits,
    entries: Vec<RecordEnvelope>,
    total_bytes: usize,
    opened_at: Option<Instant>,
}

impl BatchAccumulator {
    /// Create an empty accumulator
    pub fn new(limits: BatchLimits) -> Self {
        Self {
            limits,
            entries: Vec::new(),
            total_bytes: 0,
            opened_at: None,
        }
    }

    /// Thresholds in use
    pub fn limits(&self) -> &BatchLimits {
        &self.limits
    }

    /// Append an envelope, returning the sealed batch if a threshold was met
    ///
    /// The count trigger is checked before the byte trigger, so a batch that
    /// meets both reports `Count`.
    pub fn push(&mut self, envelope: RecordEnvelope) -> Option<Batch> {
        if self.entries.is_empty() {
            self.opened_at = Some(Instant::now());
        }
        self.total_bytes += envelope.size();
        self.entries.push(envelope);

        if self
            .limits
            .max_entries
            .is_some_and(|max| self.entries.len() >= max)
        {
            return self.take(FlushTrigger::Count);
        }
        if self.total_bytes >= self.limits.max_bytes {
            return self.take(FlushTrigger::Bytes);
        }
        None
    }

    /// Seal the batch if it is non-empty and at least `max_age` old
    pub fn on_timer_tick(&mut self, now: Instant) -> Option<Batch> {
        let max_age = self.limits.max_age?;
        let opened_at = self.opened_at?;
        if now.saturating_duration_since(opened_at) >= max_age {
            return self.take(FlushTrigger::Time);
        }
        None
    }

    /// When the open batch reaches `max_age`, `None` when empty or disabled
    pub fn deadline(&self) -> Option<Instant> {
        Some(self.opened_at? + self.limits.max_age?)
    }

    /// Seal whatever is open, `None` when empty
    pub fn take(&mut self, trigger: FlushTrigger) -> Option<Batch> {
        if self.entries.is_empty() {
            return None;
        }
        Some(Batch {
            entries: mem::take(&mut self.entries),
            total_bytes: mem::replace(&mut self.total_bytes, 0),
            created_at: self.opened_at.take().unwrap_or_else(Instant::now),
            trigger,
        })
    }

    /// Entries in the open batch
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the open batch is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes in the open batch
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// When the first entry of the open batch arrived
    pub fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }
}
