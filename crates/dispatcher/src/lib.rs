//! # Dispatcher
//!
//! Record batching and delivery.
//!
//! Responsibilities:
//! - Accumulate records into batches bounded by count, bytes and age
//! - Ship sealed batches through a `BatchTransport`
//! - Retry only the failed subset of a partially failed batch
//! - Report every record's outcome exactly once
//!
//! ```ignore
//! let dispatcher = BatchDispatcher::builder(&config, LogTransport::new("log"))
//!     .name("orders-sink")
//!     .build();
//!
//! dispatcher.append(payload, SourceRecord::new("orders", completion)).await?;
//! let snapshot = dispatcher.shutdown().await;
//! ```

pub mod accumulator;
pub mod dispatcher;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod metrics;
pub mod timer;
pub mod transports;

pub use accumulator::{Batch, BatchAccumulator, BatchLimits, FlushTrigger};
pub use contracts::{BatchTransport, SourceRecord};
pub use dispatcher::{
    BatchDispatcher, BatchDispatcherBuilder, BatchProducer, DEFAULT_DISPATCHER_NAME,
    DEFAULT_SHUTDOWN_GRACE,
};
pub use engine::{DispatchEngine, DispatchOutcome};
pub use envelope::{EnvelopeBuilder, RecordEnvelope};
pub use error::DispatcherError;
pub use metrics::{DispatcherMetrics, MetricsSnapshot};
pub use timer::FlushTimer;
pub use transports::{
    create_transport, AnyTransport, FileTransport, LogTransport, MockTransport, TransportConfig,
    TransportKind,
};
