//! Configuration validation
//!
//! Rules:
//! - identity fields (bus name, region, credentials, resource name) present
//! - batchMaxBytesSize within (0, request byte ceiling]
//! - maxRetryCount / intervalRetryTimeMs >= 0, batchPendingQueueSize > 0
//! - batchMaxSize (when enabled) <= request entry ceiling and <= batchPendingQueueSize
//! - metaDataFields only names supported metadata keys

use contracts::{
    BatchSinkConfig, ContractError, MAX_REQUEST_ENTRIES, SUPPORTED_META_DATA_FIELDS,
};
use ::validator::Validate;

/// Validate a BatchSinkConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &BatchSinkConfig) -> Result<(), ContractError> {
    validate_fields(config)?;
    validate_batch_max_size(config)?;
    validate_meta_data_fields(config)?;
    Ok(())
}

/// Field-level rules declared on the struct
fn validate_fields(config: &BatchSinkConfig) -> Result<(), ContractError> {
    let Err(errors) = config.validate() else {
        return Ok(());
    };

    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    let (field, field_errors) = match fields.first() {
        Some(first) => first,
        None => return Err(ContractError::config_validation("config", errors.to_string())),
    };
    let message = field_errors
        .first()
        .map(|e| {
            e.message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| e.code.to_string())
        })
        .unwrap_or_else(|| "invalid value".to_string());

    Err(ContractError::config_validation(option_name(field), message))
}

/// Count trigger must fit a single request and the pending queue
fn validate_batch_max_size(config: &BatchSinkConfig) -> Result<(), ContractError> {
    let Some(max_entries) = config.max_entries() else {
        return Ok(());
    };

    if max_entries > MAX_REQUEST_ENTRIES {
        return Err(ContractError::config_validation(
            "batchMaxSize",
            format!(
                "batchMaxSize ({}) must be <= {} entries per request",
                max_entries, MAX_REQUEST_ENTRIES
            ),
        ));
    }

    if config.batch_max_size > config.batch_pending_queue_size {
        return Err(ContractError::config_validation(
            "batchMaxSize / batchPendingQueueSize",
            format!(
                "batchMaxSize ({}) must be <= batchPendingQueueSize ({})",
                config.batch_max_size, config.batch_pending_queue_size
            ),
        ));
    }

    Ok(())
}

fn validate_meta_data_fields(config: &BatchSinkConfig) -> Result<(), ContractError> {
    for field in &config.meta_data_fields {
        if !SUPPORTED_META_DATA_FIELDS.contains(&field.as_str()) {
            return Err(ContractError::config_validation(
                "metaDataFields",
                format!(
                    "unsupported metadata field '{}', expected one of {:?}",
                    field, SUPPORTED_META_DATA_FIELDS
                ),
            ));
        }
    }
    Ok(())
}

/// `batch_max_size` -> `batchMaxSize`
fn option_name(field: &str) -> String {
    let mut name = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            name.extend(c.to_uppercase());
            upper = false;
        } else {
            name.push(c);
        }
    }
    name
}
