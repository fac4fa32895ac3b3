//! Engine configuration loader.
//!
//! Reads `config.toml` from the data directory and deserializes it into
//! [`EngineConfig`]. The lenient loader falls back to defaults when the file
//! is missing or malformed; [`parse_engine_config`] is the strict variant.

use std::path::{Path, PathBuf};

use canvasflow_types::config::EngineConfig;
use thiserror::Error;

/// File name of the engine config inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Parse and check an engine config.
pub fn parse_engine_config(content: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = toml::from_str(content)?;
    if config.event_bus_capacity == 0 {
        return Err(ConfigError::Invalid(
            "event_bus_capacity must be at least 1".to_string(),
        ));
    }
    if config.default_retry.is_some_and(|r| r.max_attempts == 0) {
        return Err(ConfigError::Invalid(
            "default_retry.max_attempts must be at least 1".to_string(),
        ));
    }
    Ok(config)
}

/// Read `{data_dir}/config.toml` strictly. A missing file is an error.
pub async fn read_engine_config(data_dir: &Path) -> Result<EngineConfig, ConfigError> {
    let path = data_dir.join(CONFIG_FILE);
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| ConfigError::Read { path, source })?;
    parse_engine_config(&content)
}

/// Load engine configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`EngineConfig::default()`].
/// - If the file cannot be read or parsed, logs a warning and returns the default.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    match read_engine_config(data_dir).await {
        Ok(config) => config,
        Err(ConfigError::Read { path, source })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            tracing::debug!("No config.toml found at {}, using defaults", path.display());
            EngineConfig::default()
        }
        Err(err) => {
            tracing::warn!("{err}, using defaults");
            EngineConfig::default()
        }
    }
}
