//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
///
/// Only synchronous failures surface here. Batch outcomes are reported
/// through each record's completion callback.
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Entry exceeds the transport's request ceiling, never retried
    #[error("message of {size} bytes exceeds the request ceiling of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    /// Dispatcher no longer accepts records
    #[error("dispatcher '{name}' is closed")]
    Closed { name: String },

    /// Transport creation error
    #[error("failed to create transport '{name}': {message}")]
    TransportCreation { name: String, message: String },

    /// Error from a shared contract
    #[error("contract error: {0}")]
    Contract(#[from] contracts::ContractError),
}

impl DispatcherError {
    /// Create a closed error
    pub fn closed(name: impl Into<String>) -> Self {
        Self::Closed { name: name.into() }
    }

    /// Create a transport creation error
    pub fn transport_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransportCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}
