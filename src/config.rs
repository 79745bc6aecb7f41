//! Configuration System using Figment
//!
//! This module provides strongly-typed configuration loading for the logger.
//! Configuration is layered from:
//! 1. Built-in defaults (`LoggerConfig::default()`)
//! 2. A TOML file (`sensor_logger.toml` unless another path is given)
//! 3. Environment variables prefixed with `SENSOR_LOGGER_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use sensor_logger::config::LoggerConfig;
//!
//! let config = LoggerConfig::load()?;
//! println!("Writing sessions to {}", config.storage.data_dir.display());
//! # Ok::<(), sensor_logger::error::LoggerError>(())
//! ```

use crate::error::{AppResult, LoggerError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "sensor_logger.toml";

/// Prefix for environment overrides, e.g. `SENSOR_LOGGER_STORAGE__DATA_DIR=/var/lib/logs`.
pub const ENV_PREFIX: &str = "SENSOR_LOGGER_";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Session and device file storage
    pub storage: StorageConfig,
    /// Ingestion policy
    pub ingest: IngestConfig,
    /// HTTP server settings
    pub server: ServerConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding one sub-directory per session
    pub data_dir: PathBuf,
    /// Durable session state file. Relative paths resolve against `data_dir`.
    pub state_file: PathBuf,
    /// Extension of per-device data files
    pub file_extension: String,
}

/// Ingestion policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Write batches that cannot be placed in the active session to an orphan file
    /// instead of discarding them.
    pub orphan_capture: bool,
    /// Require every sample to carry an ISO-8601 `timestamp_utc` ending in `Z`.
    pub strict_timestamps: bool,
    /// Fields every sample must carry, e.g. `sensor_time_ms`.
    pub required_fields: Vec<String>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub bind_addr: String,
    /// Tokio worker threads
    pub worker_threads: usize,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Sensor Logger".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("logs"),
            state_file: PathBuf::from("state.json"),
            file_extension: "csv".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            worker_threads: 4,
        }
    }
}

impl StorageConfig {
    /// Absolute or data-dir-relative location of the durable state file.
    pub fn state_path(&self) -> PathBuf {
        if self.state_file.is_absolute() {
            self.state_file.clone()
        } else {
            self.data_dir.join(&self.state_file)
        }
    }
}

impl LoggerConfig {
    /// Load configuration from `sensor_logger.toml` and environment variables
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from a specific file path. A missing file leaves the defaults
    /// in place.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(LoggerConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Convenience constructor for a config rooted at `data_dir` with all other
    /// settings at their defaults.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.storage.data_dir = data_dir.into();
        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(LoggerError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(LoggerError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(LoggerError::Configuration(
                "storage.data_dir cannot be empty".to_string(),
            ));
        }

        if self.storage.state_file.as_os_str().is_empty() {
            return Err(LoggerError::Configuration(
                "storage.state_file cannot be empty".to_string(),
            ));
        }

        let ext = &self.storage.file_extension;
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(LoggerError::Configuration(format!(
                "Invalid file_extension '{ext}'. Must be non-empty and alphanumeric"
            )));
        }

        if self.server.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(LoggerError::Configuration(format!(
                "Invalid bind_addr '{}'",
                self.server.bind_addr
            )));
        }

        if self.server.worker_threads == 0 {
            return Err(LoggerError::Configuration(
                "server.worker_threads must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
