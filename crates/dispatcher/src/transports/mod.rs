//! Transport implementations
//!
//! Contains LogTransport, FileTransport and MockTransport, plus the factory
//! used by the CLI.

mod file;
mod log;
mod mock;

use std::collections::HashMap;

use contracts::{BatchTransport, ContractError, PutEntry, PutResponse};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::DispatcherError;

pub use self::file::FileTransport;
pub use self::log::LogTransport;
pub use self::mock::MockTransport;

/// Built-in transport type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Log,
    File,
}

/// Transport selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Transport name (logs, metrics, event ids)
    pub name: String,
    /// Transport type
    pub kind: TransportKind,
    /// Type-specific parameters (`path` for `file`)
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Any built-in transport
#[derive(Debug)]
pub enum AnyTransport {
    Log(LogTransport),
    File(FileTransport),
    Mock(MockTransport),
}

impl BatchTransport for AnyTransport {
    fn name(&self) -> &str {
        match self {
            Self::Log(t) => t.name(),
            Self::File(t) => t.name(),
            Self::Mock(t) => t.name(),
        }
    }

    fn max_request_bytes(&self) -> usize {
        match self {
            Self::Log(t) => t.max_request_bytes(),
            Self::File(t) => t.max_request_bytes(),
            Self::Mock(t) => t.max_request_bytes(),
        }
    }

    async fn put_events(&self, entries: &[PutEntry]) -> Result<PutResponse, ContractError> {
        match self {
            Self::Log(t) => t.put_events(entries).await,
            Self::File(t) => t.put_events(entries).await,
            Self::Mock(t) => t.put_events(entries).await,
        }
    }
}

/// Create a transport from configuration
#[instrument(
    name = "dispatcher_create_transport",
    skip(config),
    fields(transport = %config.name, kind = ?config.kind)
)]
pub fn create_transport(config: &TransportConfig) -> Result<AnyTransport, DispatcherError> {
    match config.kind {
        TransportKind::Log => Ok(AnyTransport::Log(LogTransport::new(&config.name))),
        TransportKind::File => Ok(AnyTransport::File(FileTransport::from_params(
            &config.name,
            &config.params,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_log_transport() {
        let config = TransportConfig {
            name: "events".into(),
            kind: TransportKind::Log,
            params: HashMap::new(),
        };
        let transport = create_transport(&config).unwrap();
        assert!(matches!(transport, AnyTransport::Log(_)));
        assert_eq!(transport.name(), "events");
    }

    #[test]
    fn test_create_file_transport() {
        let dir = tempdir().unwrap();
        let config: TransportConfig = serde_json::from_value(serde_json::json!({
            "name": "events",
            "kind": "file",
            "params": { "path": dir.path().join("e.jsonl").display().to_string() }
        }))
        .unwrap();

        let transport = create_transport(&config).unwrap();
        assert!(matches!(transport, AnyTransport::File(_)));
    }

    #[test]
    fn test_create_file_transport_without_path_fails() {
        let config = TransportConfig {
            name: "events".into(),
            kind: TransportKind::File,
            params: HashMap::new(),
        };
        assert!(create_transport(&config).is_err());
    }
}
