//! `run` command implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use contracts::{BatchSinkConfig, RecordCompletion, RetryPolicy, SourceRecord};
use dispatcher::{
    create_transport, AnyTransport, BatchDispatcher, DispatcherError, MockTransport,
    TransportConfig, TransportKind,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use crate::cli::{RunArgs, TransportArg};
use crate::stats::{OutcomeTracker, RunStats};

/// Execute the `run` command
pub async fn run_sink(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        event_bus = %config.event_bus_name,
        region = %config.region,
        batch_max_size = config.batch_max_size,
        batch_max_bytes_size = config.batch_max_bytes_size,
        batch_max_time_ms = config.batch_max_time_ms,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let transport = build_transport(args)?;
    let dispatcher = BatchDispatcher::builder(&config, transport)
        .name(&args.name)
        .retry_policy(retry_policy(&config, args))
        .shutdown_grace(Duration::from_secs(args.shutdown_grace))
        .build();

    let tracker = Arc::new(OutcomeTracker::default());
    let started = Instant::now();

    info!(input = ?args.input, "Feeding records...");

    let records_read = tokio::select! {
        result = feed_input(&dispatcher, args, &tracker) => {
            result.context("Failed to feed records")?
        }
        _ = setup_shutdown_signal() => {
            warn!("Received shutdown signal, stopping intake...");
            dispatcher.metrics().appended + dispatcher.metrics().rejected
        }
    };

    let snapshot = dispatcher.shutdown().await;
    let stats = RunStats::collect(records_read, &tracker, snapshot, started.elapsed());

    info!(
        records = stats.records_read,
        succeeded = stats.succeeded,
        failed = stats.failed,
        duration_secs = stats.duration.as_secs_f64(),
        "Batch sink finished"
    );
    stats.print_summary();

    Ok(())
}

fn build_transport(args: &RunArgs) -> Result<AnyTransport> {
    let transport = match args.transport {
        TransportArg::Log => create_transport(&TransportConfig {
            name: args.name.clone(),
            kind: TransportKind::Log,
            params: HashMap::new(),
        })?,
        TransportArg::File => {
            let output = args
                .output
                .as_ref()
                .context("--output is required for the file transport")?;
            create_transport(&TransportConfig {
                name: args.name.clone(),
                kind: TransportKind::File,
                params: HashMap::from([("path".to_string(), output.display().to_string())]),
            })?
        }
        TransportArg::Mock if args.fail_every > 0 => {
            AnyTransport::Mock(MockTransport::fail_every(&args.name, args.fail_every))
        }
        TransportArg::Mock => AnyTransport::Mock(MockTransport::accept_all(&args.name)),
    };
    Ok(transport)
}

fn retry_policy(config: &BatchSinkConfig, args: &RunArgs) -> RetryPolicy {
    let mut policy = config.retry_policy();
    if let Some(count) = args.max_retry_count {
        policy.max_retry_count = count;
    }
    if let Some(ms) = args.interval_retry_time_ms {
        policy.interval = Duration::from_millis(ms);
    }
    policy
}

/// Append every non-empty input line, returning how many were read
async fn feed_input(
    dispatcher: &BatchDispatcher,
    args: &RunArgs,
    tracker: &Arc<OutcomeTracker>,
) -> Result<u64> {
    match &args.input {
        Some(path) => {
            let file = open_input(path).await?;
            feed_lines(dispatcher, &args.topic, BufReader::new(file), tracker).await
        }
        None => {
            feed_lines(
                dispatcher,
                &args.topic,
                BufReader::new(tokio::io::stdin()),
                tracker,
            )
            .await
        }
    }
}

async fn open_input(path: &Path) -> Result<tokio::fs::File> {
    tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open input {}", path.display()))
}

async fn feed_lines<R>(
    dispatcher: &BatchDispatcher,
    topic: &str,
    reader: R,
    tracker: &Arc<OutcomeTracker>,
) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut read: u64 = 0;

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        if line.trim().is_empty() {
            continue;
        }
        read += 1;

        let completion: Arc<dyn RecordCompletion> = tracker.clone();
        let record = SourceRecord::new(topic, completion)
            .with_metadata("message_id", read.to_string())
            .with_metadata("event_time", Utc::now().timestamp_millis().to_string());

        match dispatcher.append(line, record).await {
            Ok(()) => {}
            Err(e @ DispatcherError::MessageTooLarge { .. }) => {
                warn!(line = read, error = %e, "Record skipped");
            }
            Err(e) => {
                error!(line = read, error = %e, "Dispatcher stopped accepting records");
                return Err(e.into());
            }
        }
    }

    Ok(read)
}

/// Setup Ctrl+C and SIGTERM signal handlers
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &BatchSinkConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Event bus:");
    println!("  Name: {}", config.event_bus_name);
    println!("  Resource: {}", config.event_bus_resource_name);
    println!("  Region: {}", config.region);

    println!("\nBatching:");
    println!("  batchMaxSize: {}", config.batch_max_size);
    println!("  batchMaxBytesSize: {}", config.batch_max_bytes_size);
    println!("  batchMaxTimeMs: {}", config.batch_max_time_ms);
    println!("  batchPendingQueueSize: {}", config.batch_pending_queue_size);

    println!("\nRetry:");
    println!("  maxRetryCount: {}", config.max_retry_count);
    println!("  intervalRetryTimeMs: {}", config.interval_retry_time_ms);

    if !config.meta_data_fields.is_empty() {
        let fields: Vec<&str> = config.meta_data_fields.iter().map(String::as_str).collect();
        println!("\nMetadata fields: {}", fields.join(", "));
    }

    println!();
}
