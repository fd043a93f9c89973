//! RecordEnvelope - a source record prepared for batching

use std::collections::BTreeSet;

use bytes::Bytes;
use contracts::{BatchSinkConfig, Completion, FailureReason, PutEntry, SourceRecord};
use tokio::sync::OwnedSemaphorePermit;

/// Record payload, its request entry and its completion handle
///
/// The envelope owns the record until `succeed` or `fail` consumes it. A
/// backpressure permit, when attached, is released together with the envelope.
#[derive(Debug)]
pub struct RecordEnvelope {
    entry: PutEntry,
    size: usize,
    completion: Completion,
    permit: Option<OwnedSemaphorePermit>,
}

impl RecordEnvelope {
    /// Request entry
    pub fn entry(&self) -> &PutEntry {
        &self.entry
    }

    /// Serialized entry size
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether this envelope occupies a pending-queue slot
    pub fn holds_permit(&self) -> bool {
        self.permit.is_some()
    }

    pub(crate) fn attach_permit(&mut self, permit: OwnedSemaphorePermit) {
        self.permit = Some(permit);
    }

    /// Report delivery
    pub fn succeed(self) {
        self.completion.succeed();
    }

    /// Report permanent failure
    pub fn fail(self, reason: FailureReason) {
        self.completion.fail(reason);
    }
}

/// Builds envelopes with the sink-wide entry fields
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    source: String,
    event_bus_name: String,
    resources: Vec<String>,
    meta_data_fields: BTreeSet<String>,
}

impl EnvelopeBuilder {
    /// Create a builder labelling entries with `source`
    pub fn new(source: impl Into<String>, config: &BatchSinkConfig) -> Self {
        Self {
            source: source.into(),
            event_bus_name: config.event_bus_name.clone(),
            resources: vec![config.event_bus_resource_name.clone()],
            meta_data_fields: config.meta_data_fields.clone(),
        }
    }

    /// Wrap a payload and its record
    ///
    /// Only metadata keys listed in `metaDataFields` are carried over. The
    /// event time is left to the endpoint, so it adds nothing to the size.
    pub fn build(&self, payload: impl Into<Bytes>, record: SourceRecord) -> RecordEnvelope {
        let (topic, metadata, completion) = record.into_parts();
        let metadata = metadata
            .into_iter()
            .filter(|(key, _)| self.meta_data_fields.contains(key))
            .collect();

        let entry = PutEntry {
            event_bus_name: self.event_bus_name.clone(),
            source: self.source.clone(),
            detail_type: topic,
            detail: payload.into(),
            resources: self.resources.clone(),
            time: None,
            metadata,
        };
        let size = entry.size();

        RecordEnvelope {
            entry,
            size,
            completion,
            permit: None,
        }
    }
}
