//! # Sensor Logger Core Library
//!
//! Session-scoped data logger for networked sensor devices. Devices poll for
//! whether logging is active, push batches of samples, and an operator starts and
//! stops sessions. Each session gets its own directory with one CSV per device,
//! and stopping a session delivers a zip of those files.
//!
//! ## Crate Structure
//!
//! - **`config`**: Layered configuration (`sensor_logger.toml` plus `SENSOR_LOGGER_*`
//!   environment overrides) loaded with figment.
//! - **`session`**: The durable session state file and the coordinator that owns
//!   start/stop transitions across workers and processes.
//! - **`data`**: The per-device append sink and the session archiver.
//! - **`service`**: `LoggerService`, the operations the HTTP and CLI boundaries call.
//! - **`messages`**: Request and response shapes.
//! - **`http`**: The axum server (feature `http`).
//! - **`error`**: The `LoggerError` enum shared across the crate.
//! - **`tracing_setup`**: Subscriber initialization.
//! - **`validation`**: Device id, timestamp and batch checks.

pub mod config;
pub mod data;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod messages;
pub mod service;
pub mod session;
pub mod tracing_setup;
pub mod validation;

/// One device sample: field name to scalar value.
pub type Sample = serde_json::Map<String, serde_json::Value>;

pub use config::LoggerConfig;
pub use error::{AppResult, LoggerError};
pub use service::LoggerService;
