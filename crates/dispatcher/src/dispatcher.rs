//! BatchDispatcher - worker loop owning the open batch

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use contracts::{BatchSinkConfig, BatchTransport, FailureReason, RetryPolicy, SourceRecord};
use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::accumulator::{Batch, BatchAccumulator, BatchLimits, FlushTrigger};
use crate::engine::{DispatchEngine, DispatchOutcome};
use crate::envelope::{EnvelopeBuilder, RecordEnvelope};
use crate::error::DispatcherError;
use crate::metrics::{DispatcherMetrics, MetricsSnapshot};
use crate::timer::FlushTimer;

/// Default dispatcher name, also the entry source label
pub const DEFAULT_DISPATCHER_NAME: &str = "batch-sink";

/// Default wait for in-flight batches on shutdown
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Messages handled by the worker task
#[derive(Debug)]
enum Command {
    Append(RecordEnvelope),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Cloneable append-only handle
///
/// Any number of producer tasks may append concurrently; envelopes reach the
/// worker in the order their sends complete.
#[derive(Debug, Clone)]
pub struct BatchProducer {
    name: Arc<str>,
    builder: Arc<EnvelopeBuilder>,
    max_message_bytes: usize,
    pending_queue_size: usize,
    permits: Arc<Semaphore>,
    tx: mpsc::Sender<Command>,
    metrics: Arc<DispatcherMetrics>,
}

impl BatchProducer {
    /// Dispatcher name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submit a record for batching
    ///
    /// Waits while `batchPendingQueueSize` records are unacknowledged. On error
    /// the record's completion has already been failed.
    ///
    /// # Errors
    /// - `MessageTooLarge` when the entry exceeds the message ceiling, see
    ///   [`BatchSinkConfig::max_message_bytes`]
    /// - `Closed` after shutdown started
    #[instrument(
        name = "batch_producer_append",
        skip(self, payload, record),
        fields(dispatcher = %self.name, topic = %record.topic())
    )]
    pub async fn append(
        &self,
        payload: impl Into<Bytes>,
        record: SourceRecord,
    ) -> Result<(), DispatcherError> {
        let mut envelope = self.builder.build(payload, record);
        let size = envelope.size();

        if size > self.max_message_bytes {
            self.metrics.inc_rejected();
            observability::record_message_too_large(&self.name);
            warn!(
                dispatcher = %self.name,
                size,
                max = self.max_message_bytes,
                "Message too large, failing without retry"
            );
            envelope.fail(FailureReason::MessageTooLarge {
                size,
                max: self.max_message_bytes,
            });
            return Err(DispatcherError::MessageTooLarge {
                size,
                max: self.max_message_bytes,
            });
        }

        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return Err(self.reject_closed(envelope)),
        };
        envelope.attach_permit(permit);

        if let Err(mpsc::error::SendError(command)) = self.tx.send(Command::Append(envelope)).await
        {
            if let Command::Append(envelope) = command {
                return Err(self.reject_closed(envelope));
            }
            return Err(DispatcherError::closed(&*self.name));
        }

        self.metrics.inc_appended();
        observability::record_pending_records(
            &self.name,
            self.pending_queue_size
                .saturating_sub(self.permits.available_permits()),
        );
        Ok(())
    }

    fn reject_closed(&self, envelope: RecordEnvelope) -> DispatcherError {
        self.metrics.inc_rejected();
        debug!(dispatcher = %self.name, "Append after shutdown rejected");
        envelope.fail(FailureReason::Shutdown);
        DispatcherError::closed(&*self.name)
    }
}

/// Builder for creating a BatchDispatcher
pub struct BatchDispatcherBuilder<T> {
    config: BatchSinkConfig,
    transport: T,
    name: String,
    retry_policy: RetryPolicy,
    shutdown_grace: Duration,
}

impl<T> BatchDispatcherBuilder<T>
where
    T: BatchTransport + Sync + 'static,
{
    /// Dispatcher name, used as entry source and in logs/metrics
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override the retry policy derived from the config
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// How long shutdown waits for in-flight batches
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Build and start the dispatcher
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(name = "batch_dispatcher_build", skip(self), fields(dispatcher = %self.name))]
    pub fn build(self) -> BatchDispatcher {
        let limits = BatchLimits::from_config(&self.config);
        let pending_queue_size = self
            .config
            .pending_queue_size()
            .min(Semaphore::MAX_PERMITS);

        let transport = Arc::new(self.transport);
        let max_message_bytes = self.config.max_message_bytes(transport.max_request_bytes());
        let metrics = Arc::new(DispatcherMetrics::new());
        let (abort_tx, abort_rx) = watch::channel(false);
        let (tx, rx) = mpsc::channel(pending_queue_size);

        info!(
            dispatcher = %self.name,
            transport = %transport.name(),
            max_entries = ?limits.max_entries,
            max_bytes = limits.max_bytes,
            max_age_ms = ?limits.max_age.map(|age| age.as_millis()),
            max_message_bytes,
            max_retry_count = self.retry_policy.max_retry_count,
            pending_queue_size,
            "Batch dispatcher started"
        );

        let engine = Arc::new(DispatchEngine::new(
            self.name.clone(),
            transport,
            self.retry_policy,
            Arc::clone(&metrics),
            abort_rx,
        ));

        let worker = Worker {
            name: self.name.clone(),
            accumulator: BatchAccumulator::new(limits),
            engine,
            metrics: Arc::clone(&metrics),
            in_flight: JoinSet::new(),
            shutdown_grace: self.shutdown_grace,
            abort_tx,
        };
        let worker = tokio::spawn(worker.run(rx));

        let producer = BatchProducer {
            name: Arc::from(self.name.as_str()),
            builder: Arc::new(EnvelopeBuilder::new(self.name, &self.config)),
            max_message_bytes,
            pending_queue_size,
            permits: Arc::new(Semaphore::new(pending_queue_size)),
            tx,
            metrics,
        };

        BatchDispatcher { producer, worker }
    }
}

/// Batches records and ships them through a transport
pub struct BatchDispatcher {
    producer: BatchProducer,
    worker: JoinHandle<()>,
}

impl BatchDispatcher {
    /// Start building a dispatcher for a validated config
    pub fn builder<T>(config: &BatchSinkConfig, transport: T) -> BatchDispatcherBuilder<T>
    where
        T: BatchTransport + Sync + 'static,
    {
        BatchDispatcherBuilder {
            config: config.clone(),
            transport,
            name: DEFAULT_DISPATCHER_NAME.to_string(),
            retry_policy: config.retry_policy(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Dispatcher name
    pub fn name(&self) -> &str {
        self.producer.name()
    }

    /// Submit a record for batching, see [`BatchProducer::append`]
    pub async fn append(
        &self,
        payload: impl Into<Bytes>,
        record: SourceRecord,
    ) -> Result<(), DispatcherError> {
        self.producer.append(payload, record).await
    }

    /// Cloneable append handle for producer tasks
    pub fn producer(&self) -> BatchProducer {
        self.producer.clone()
    }

    /// Seal the open batch and hand it to the dispatch engine
    ///
    /// Resolves once the hand-off happened, not when delivery finished.
    #[instrument(name = "batch_dispatcher_flush", skip(self), fields(dispatcher = %self.name()))]
    pub async fn flush(&self) -> Result<(), DispatcherError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.producer
            .tx
            .send(Command::Flush(done_tx))
            .await
            .map_err(|_| DispatcherError::closed(self.name()))?;
        done_rx
            .await
            .map_err(|_| DispatcherError::closed(self.name()))
    }

    /// Get current metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        self.producer.metrics.snapshot()
    }

    /// Stop intake, flush what is buffered and wait for in-flight batches
    ///
    /// Batches still in flight after the shutdown grace period are aborted
    /// and their remaining records fail with `FailureReason::Shutdown`.
    #[instrument(name = "batch_dispatcher_shutdown", skip(self), fields(dispatcher = %self.name()))]
    pub async fn shutdown(self) -> MetricsSnapshot {
        self.producer.permits.close();
        if self.producer.tx.send(Command::Shutdown).await.is_err() {
            warn!(dispatcher = %self.name(), "Worker already stopped");
        }
        if let Err(e) = self.worker.await {
            error!(dispatcher = %self.producer.name, error = ?e, "Worker task panicked");
        }

        let snapshot = self.producer.metrics.snapshot();
        info!(
            dispatcher = %self.producer.name,
            appended = snapshot.appended,
            succeeded = snapshot.succeeded,
            failed = snapshot.failed,
            "Batch dispatcher shutdown complete"
        );
        snapshot
    }
}

/// State owned by the worker task
struct Worker<T> {
    name: String,
    accumulator: BatchAccumulator,
    engine: Arc<DispatchEngine<T>>,
    metrics: Arc<DispatcherMetrics>,
    in_flight: JoinSet<DispatchOutcome>,
    shutdown_grace: Duration,
    abort_tx: watch::Sender<bool>,
}

impl<T> Worker<T>
where
    T: BatchTransport + Sync + 'static,
{
    #[instrument(name = "batch_dispatcher_worker_loop", skip(self, rx), fields(dispatcher = %self.name))]
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        debug!(dispatcher = %self.name, "Worker started");
        let mut timer = FlushTimer::new();

        loop {
            timer.reset(self.accumulator.deadline());
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                now = timer.tick() => {
                    if let Some(batch) = self.accumulator.on_timer_tick(now) {
                        self.spawn_dispatch(batch);
                    }
                }
                Some(result) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    self.on_dispatch_finished(result);
                }
            }
        }

        rx.close();
        while let Some(command) = rx.recv().await {
            self.handle(command);
        }
        if let Some(batch) = self.accumulator.take(FlushTrigger::Shutdown) {
            self.spawn_dispatch(batch);
        }

        self.drain_in_flight().await;
        debug!(dispatcher = %self.name, "Worker stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Append(envelope) => {
                if let Some(batch) = self.accumulator.push(envelope) {
                    self.spawn_dispatch(batch);
                }
            }
            Command::Flush(done) => {
                if let Some(batch) = self.accumulator.take(FlushTrigger::Manual) {
                    self.spawn_dispatch(batch);
                }
                let _ = done.send(());
            }
            Command::Shutdown => {}
        }
    }

    fn spawn_dispatch(&mut self, batch: Batch) {
        debug!(
            dispatcher = %self.name,
            entries = batch.len(),
            bytes = batch.total_bytes(),
            trigger = batch.trigger().as_str(),
            "Batch sealed"
        );
        observability::record_batch_flushed(
            &self.name,
            batch.trigger().as_str(),
            batch.len(),
            batch.total_bytes(),
        );
        self.metrics.inc_batches_flushed();

        let engine = Arc::clone(&self.engine);
        self.in_flight
            .spawn(async move { engine.dispatch(batch).await });
        self.metrics.set_in_flight_batches(self.in_flight.len());
    }

    fn on_dispatch_finished(&self, result: Result<DispatchOutcome, JoinError>) {
        match result {
            Ok(outcome) => debug!(
                dispatcher = %self.name,
                succeeded = outcome.succeeded,
                failed = outcome.failed,
                attempts = outcome.attempts,
                "Batch finished"
            ),
            Err(e) => error!(dispatcher = %self.name, error = ?e, "Dispatch task failed"),
        }
        self.metrics.set_in_flight_batches(self.in_flight.len());
    }

    async fn drain_in_flight(&mut self) {
        let in_flight = self.in_flight.len();
        if in_flight == 0 {
            return;
        }
        info!(
            dispatcher = %self.name,
            in_flight,
            grace_ms = self.shutdown_grace.as_millis() as u64,
            "Waiting for in-flight batches"
        );

        let grace = self.shutdown_grace;
        let finished = tokio::time::timeout(grace, async {
            while let Some(result) = self.in_flight.join_next().await {
                self.on_dispatch_finished(result);
            }
        })
        .await;

        if finished.is_err() {
            warn!(
                dispatcher = %self.name,
                remaining = self.in_flight.len(),
                "Shutdown grace period elapsed, aborting in-flight batches"
            );
            self.abort_tx.send_replace(true);
            while let Some(result) = self.in_flight.join_next().await {
                self.on_dispatch_finished(result);
            }
        }
    }
}
