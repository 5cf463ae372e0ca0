//! Configuration file handling for the generation pipeline.
//!
//! Loads a `[pipeline]` section from an INI file and overlays it on the
//! built-in defaults. A missing file is not an error; a present key with
//! a bad value is.

use std::path::Path;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::pipeline::PipelineConfig;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// Load pipeline configuration from `path`.
///
/// If the file doesn't exist, returns defaults.
pub fn load_pipeline_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    if !path.exists() {
        return Ok(PipelineConfig::default());
    }

    let ini = Ini::load_from_file(path)?;
    parse_ini(&ini)
}

/// Overlay any `[pipeline]` values found in the INI onto the defaults.
fn parse_ini(ini: &Ini) -> Result<PipelineConfig, ConfigError> {
    let mut config = PipelineConfig::default();

    if let Some(section) = ini.section(Some("pipeline")) {
        if let Some(v) = section.get("batch_size") {
            config.batch_size = v.parse().map_err(|_| ConfigError::InvalidValue {
                section: "pipeline".to_string(),
                key: "batch_size".to_string(),
                value: v.to_string(),
                reason: "must be a positive integer".to_string(),
            })?;
        }
        if let Some(v) = section.get("max_retries") {
            config.max_retries = v.parse().map_err(|_| ConfigError::InvalidValue {
                section: "pipeline".to_string(),
                key: "max_retries".to_string(),
                value: v.to_string(),
                reason: "must be a non-negative integer".to_string(),
            })?;
        }
        if let Some(v) = section.get("retries_enabled") {
            config.retries_enabled = parse_bool(v);
        }
        if let Some(v) = section.get("encode_timeout_secs") {
            let secs: u64 = v.parse().map_err(|_| ConfigError::InvalidValue {
                section: "pipeline".to_string(),
                key: "encode_timeout_secs".to_string(),
                value: v.to_string(),
                reason: "must be a positive integer (seconds)".to_string(),
            })?;
            config.encode_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = section.get("batch_delay_ms") {
            let millis: u64 = v.parse().map_err(|_| ConfigError::InvalidValue {
                section: "pipeline".to_string(),
                key: "batch_delay_ms".to_string(),
                value: v.to_string(),
                reason: "must be a non-negative integer (milliseconds)".to_string(),
            })?;
            config.batch_delay = Duration::from_millis(millis);
        }
    }

    Ok(config.normalized())
}

fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}
