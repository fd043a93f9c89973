//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::BatchSinkConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Debug, Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Debug, Serialize)]
struct ConfigSummary {
    event_bus_name: String,
    region: String,
    batch_max_size: i64,
    batch_max_bytes_size: i64,
    batch_max_time_ms: i64,
    max_retry_count: i64,
    interval_retry_time_ms: i64,
    batch_pending_queue_size: i64,
    meta_data_fields: Vec<String>,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    event_bus_name: config.event_bus_name.clone(),
                    region: config.region.clone(),
                    batch_max_size: config.batch_max_size,
                    batch_max_bytes_size: config.batch_max_bytes_size,
                    batch_max_time_ms: config.batch_max_time_ms,
                    max_retry_count: config.max_retry_count,
                    interval_retry_time_ms: config.interval_retry_time_ms,
                    batch_pending_queue_size: config.batch_pending_queue_size,
                    meta_data_fields: config.meta_data_fields.iter().cloned().collect(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &BatchSinkConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.max_entries().is_none() && config.max_age().is_none() {
        warnings.push(
            "batchMaxSize and batchMaxTimeMs are disabled - only batchMaxBytesSize triggers flushes"
                .to_string(),
        );
    }

    if config.max_retry_count == 0 {
        warnings.push("maxRetryCount is 0 - failed entries are never retried".to_string());
    }

    if config.max_retry_count > 0 && config.interval_retry_time_ms == 0 {
        warnings.push("intervalRetryTimeMs is 0 - retries are sent back to back".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Event bus: {}", summary.event_bus_name);
            println!("  Region: {}", summary.region);
            println!("  batchMaxSize: {}", summary.batch_max_size);
            println!("  batchMaxBytesSize: {}", summary.batch_max_bytes_size);
            println!("  batchMaxTimeMs: {}", summary.batch_max_time_ms);
            println!("  maxRetryCount: {}", summary.max_retry_count);
            println!("  intervalRetryTimeMs: {}", summary.interval_retry_time_ms);
            println!("  batchPendingQueueSize: {}", summary.batch_pending_queue_size);
            println!("  metaDataFields: {}", summary.meta_data_fields.join(", "));
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
