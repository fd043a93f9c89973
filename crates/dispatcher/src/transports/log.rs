//! LogTransport - logs batch summaries via tracing and accepts every entry

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::{BatchTransport, ContractError, PutEntry, PutResponse, PutResultEntry};
use tracing::{debug, info, instrument};

/// Transport that logs entries for debugging
#[derive(Debug)]
pub struct LogTransport {
    name: String,
    next_id: AtomicU64,
}

impl LogTransport {
    /// Create a new LogTransport with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_id: AtomicU64::new(0),
        }
    }

    fn next_event_id(&self) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{}-{id}", self.name)
    }
}

impl BatchTransport for LogTransport {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_transport_put_events",
        skip(self, entries),
        fields(transport = %self.name, entries = entries.len())
    )]
    async fn put_events(&self, entries: &[PutEntry]) -> Result<PutResponse, ContractError> {
        let bytes: usize = entries.iter().map(PutEntry::size).sum();
        info!(
            transport = %self.name,
            entries = entries.len(),
            bytes,
            "Batch received"
        );

        let results = entries
            .iter()
            .map(|entry| {
                let event_id = self.next_event_id();
                debug!(
                    event_id = %event_id,
                    detail_type = %entry.detail_type,
                    size = entry.size(),
                    "Entry accepted"
                );
                PutResultEntry::ok(event_id)
            })
            .collect();

        Ok(PutResponse::from_entries(results))
    }
}
