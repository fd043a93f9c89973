//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Batch Sink - batches records and ships them to an event bus transport
#[derive(Parser, Debug)]
#[command(
    name = "batch-sink",
    author,
    version,
    about = "Batching event sink",
    long_about = "Batches records by count, size and age and ships them through a transport.\n\n\
                  Partially failed batches are retried entry by entry; every record's \n\
                  outcome is reported exactly once."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "BATCH_SINK_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "BATCH_SINK_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Feed records through a batch dispatcher
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "batch-sink.toml",
        env = "BATCH_SINK_CONFIG"
    )]
    pub config: PathBuf,

    /// Input file with one record per line (stdin when omitted)
    #[arg(short, long, env = "BATCH_SINK_INPUT")]
    pub input: Option<PathBuf>,

    /// Sink name, used as the entry source
    #[arg(long, default_value = "batch-sink", env = "BATCH_SINK_NAME")]
    pub name: String,

    /// Topic assigned to every record
    #[arg(long, default_value = "events", env = "BATCH_SINK_TOPIC")]
    pub topic: String,

    /// Transport receiving the batches
    #[arg(long, value_enum, default_value = "log", env = "BATCH_SINK_TRANSPORT")]
    pub transport: TransportArg,

    /// Output file for the `file` transport
    #[arg(long, env = "BATCH_SINK_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Fail every n-th entry (`mock` transport only, 0 = never)
    #[arg(long, default_value = "0")]
    pub fail_every: usize,

    /// Override maxRetryCount from configuration
    #[arg(long)]
    pub max_retry_count: Option<u32>,

    /// Override intervalRetryTimeMs from configuration
    #[arg(long)]
    pub interval_retry_time_ms: Option<u64>,

    /// Seconds to wait for in-flight batches on shutdown
    #[arg(long, default_value = "30", env = "BATCH_SINK_SHUTDOWN_GRACE")]
    pub shutdown_grace: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "BATCH_SINK_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "batch-sink.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Transport selection
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportArg {
    /// Log every batch
    #[default]
    Log,
    /// Append JSON lines to `--output`
    File,
    /// Accept everything, optionally failing every n-th entry
    Mock,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
