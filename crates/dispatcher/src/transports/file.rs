//! FileTransport - appends entries to a file as JSON lines

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use contracts::{BatchTransport, ContractError, PutEntry, PutResponse, PutResultEntry};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::DispatcherError;

/// One written line
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventLine<'a> {
    event_id: &'a str,
    event_bus_name: &'a str,
    source: &'a str,
    detail_type: &'a str,
    detail: Cow<'a, str>,
    resources: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    time: Option<String>,
    metadata: &'a BTreeMap<String, String>,
}

/// Transport that writes every entry to a JSON lines file
#[derive(Debug)]
pub struct FileTransport {
    name: String,
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    next_id: AtomicU64,
}

impl FileTransport {
    /// Open (or create) `path` for appending
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, ContractError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            name: name.into(),
            path,
            writer: Mutex::new(BufWriter::new(file)),
            next_id: AtomicU64::new(0),
        })
    }

    /// Create from params map (for factory); requires `path`
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, DispatcherError> {
        let name = name.into();
        let path = params
            .get("path")
            .ok_or_else(|| DispatcherError::transport_creation(&name, "missing 'path' param"))?;
        Ok(Self::new(name, path)?)
    }

    /// Output file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_entries(&self, entries: &[PutEntry]) -> std::io::Result<Vec<PutResultEntry>> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("file writer lock poisoned"))?;

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            let event_id = format!(
                "{}-{}",
                self.name,
                self.next_id.fetch_add(1, Ordering::Relaxed)
            );
            let line = EventLine {
                event_id: &event_id,
                event_bus_name: &entry.event_bus_name,
                source: &entry.source,
                detail_type: &entry.detail_type,
                detail: String::from_utf8_lossy(&entry.detail),
                resources: &entry.resources,
                time: entry.time.map(|t| t.to_rfc3339()),
                metadata: &entry.metadata,
            };
            serde_json::to_writer(&mut *writer, &line)?;
            writer.write_all(b"\n")?;
            results.push(PutResultEntry::ok(event_id));
        }
        writer.flush()?;
        Ok(results)
    }
}

impl BatchTransport for FileTransport {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_transport_put_events",
        skip(self, entries),
        fields(transport = %self.name, entries = entries.len())
    )]
    async fn put_events(&self, entries: &[PutEntry]) -> Result<PutResponse, ContractError> {
        let results = self
            .write_entries(entries)
            .map_err(|e| ContractError::transport(&self.name, e.to_string()))?;
        debug!(path = %self.path.display(), written = results.len(), "Entries written");
        Ok(PutResponse::from_entries(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use tempfile::tempdir;

    fn entry(detail: &'static str) -> PutEntry {
        PutEntry {
            event_bus_name: "bus".into(),
            source: "sink".into(),
            detail_type: "orders".into(),
            detail: Bytes::from_static(detail.as_bytes()),
            resources: vec!["arn".into()],
            time: Some(Utc::now()),
            metadata: BTreeMap::from([("message_id".to_string(), "1:0".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_file_transport_writes_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("events.jsonl");
        let transport = FileTransport::new("file", &path).unwrap();

        let response = transport
            .put_events(&[entry(r#"{"a":1}"#), entry("plain")])
            .await
            .unwrap();
        assert_eq!(response.entries.len(), 2);
        assert_eq!(response.failed_entry_count, 0);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["eventId"], "file-0");
        assert_eq!(lines[0]["detailType"], "orders");
        assert_eq!(lines[0]["detail"], r#"{"a":1}"#);
        assert_eq!(lines[1]["metadata"]["message_id"], "1:0");
    }

    #[test]
    fn test_from_params_requires_path() {
        let result = FileTransport::from_params("file", &HashMap::new());
        assert!(matches!(
            result,
            Err(DispatcherError::TransportCreation { .. })
        ));
    }

    #[test]
    fn test_from_params() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let params = HashMap::from([("path".to_string(), path.display().to_string())]);

        let transport = FileTransport::from_params("file", &params).unwrap();
        assert_eq!(transport.path(), path.as_path());
        assert!(path.exists());
    }
}
