//! Custom error types for the logger.
//!
//! This module defines the primary error type, `LoggerError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of failures the session engine can run into, from malformed
//! device batches to storage and locking problems.
//!
//! ## Error Hierarchy
//!
//! - **`Validation`**: A device batch or request was malformed. The batch is rejected
//!   whole and nothing is written. The HTTP layer maps this to `400`.
//! - **`Config`** / **`Configuration`**: Loading (figment) or semantic validation of
//!   `LoggerConfig` failed.
//! - **`Io`**, **`Serialization`**, **`Csv`**, **`Archive`**: Storage-level failures
//!   while persisting state, appending rows or packaging a session.
//! - **`Lock`**: An advisory file lock could not be acquired.
//! - **`NoActiveSession`**: A stop was requested while nothing is running. The service
//!   boundary reports this as a status instead of an error; strict callers such as the
//!   CLI surface it directly.
//!
//! There is no "not logging" variant: ingesting while no session is active is a normal
//! outcome (see `IngestOutcome::Ignored`).

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, LoggerError>;

#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum LoggerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("No active session")]
    NoActiveSession,
}

impl LoggerError {
    /// Returns true if the error was caused by the caller's input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, LoggerError::Validation(_))
    }
}

impl From<csv::IntoInnerError<csv::Writer<Vec<u8>>>> for LoggerError {
    fn from(value: csv::IntoInnerError<csv::Writer<Vec<u8>>>) -> Self {
        LoggerError::Io(value.into_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_client_error() {
        let err = LoggerError::Validation("device_id must not be empty".into());
        assert!(err.is_client_error());
        assert_eq!(
            err.to_string(),
            "Validation error: device_id must not be empty"
        );
    }

    #[test]
    fn storage_errors_are_server_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: LoggerError = io.into();
        assert!(!err.is_client_error());
        assert!(err.to_string().contains("denied"));
        assert!(!LoggerError::NoActiveSession.is_client_error());
    }
}
