//! # Config Loader
//!
//! Configuration loading and validation for the batch sink.
//!
//! Responsibilities:
//! - Parse option maps, TOML and JSON configuration files
//! - Fill defaults for every optional option
//! - Validate configuration legality
//!
//! Downstream crates assume a config returned from here satisfies every rule
//! and never re-validate.
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("sink.toml")).unwrap();
//! println!("Bus: {}", config.event_bus_name);
//! ```

mod parser;
mod validator;

pub use contracts::BatchSinkConfig;
pub use parser::ConfigFormat;

use contracts::ContractError;
use serde_json::{Map, Value};
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from maps, files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from an option map
    ///
    /// # Errors
    /// - Unknown option or wrong value type
    /// - Validation failure
    pub fn load(raw: &Map<String, Value>) -> Result<BatchSinkConfig, ContractError> {
        let config = parser::parse_map(raw)?;
        validator::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<BatchSinkConfig, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<BatchSinkConfig, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Validate an already constructed config
    pub fn validate(config: &BatchSinkConfig) -> Result<(), ContractError> {
        validator::validate(config)
    }

    /// Serialize config to TOML string
    pub fn to_toml(config: &BatchSinkConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize config to JSON string
    pub fn to_json(config: &BatchSinkConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<BatchSinkConfig, ContractError> {
        let config = parser::parse(content, format)?;
        validator::validate(&config)?;
        Ok(config)
    }
}
