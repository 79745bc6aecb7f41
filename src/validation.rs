//! Input validation for device requests.
//!
//! These rules belong to the request boundary: the sink assumes its inputs have
//! already passed them.

use crate::config::IngestConfig;
use crate::error::{AppResult, LoggerError};
use crate::Sample;
use once_cell::sync::Lazy;
use regex::Regex;

/// ISO-8601 UTC timestamp with a literal `Z`, e.g. `2024-05-01T12:00:00.125Z`.
#[allow(clippy::expect_used)]
static ISO_UTC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?Z$")
        .expect("ISO-8601 pattern is valid")
});

/// Maximum accepted device id length.
pub const MAX_DEVICE_ID_LEN: usize = 128;

/// Validates that a device id is non-empty and usable as a file name.
///
/// # Returns
///
/// * `Ok(())` if the id is valid.
/// * `Err(&'static str)` describing the first rule it breaks.
pub fn is_valid_device_id(device_id: &str) -> Result<(), &'static str> {
    if device_id.trim().is_empty() {
        return Err("device_id cannot be empty");
    }
    if device_id.len() > MAX_DEVICE_ID_LEN {
        return Err("device_id is too long");
    }
    if device_id.starts_with('.') {
        return Err("device_id cannot start with '.'");
    }
    if device_id
        .chars()
        .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control())
    {
        return Err("device_id cannot contain path separators or control characters");
    }
    Ok(())
}

/// Validates an ISO-8601 UTC timestamp string ending in `Z`.
pub fn is_iso8601_utc(value: &str) -> Result<(), &'static str> {
    if ISO_UTC.is_match(value) {
        Ok(())
    } else {
        Err("timestamp_utc must be ISO 8601 with Z")
    }
}

/// Validates a whole ingestion request. Any violation rejects the entire batch.
pub fn validate_batch(device_id: &str, samples: &[Sample], policy: &IngestConfig) -> AppResult<()> {
    is_valid_device_id(device_id).map_err(|e| LoggerError::Validation(e.to_string()))?;

    for (index, sample) in samples.iter().enumerate() {
        for field in &policy.required_fields {
            if !sample.contains_key(field) {
                return Err(LoggerError::Validation(format!(
                    "sample {index}: missing {field}"
                )));
            }
        }

        if policy.strict_timestamps {
            let timestamp = sample
                .get("timestamp_utc")
                .ok_or_else(|| {
                    LoggerError::Validation(format!("sample {index}: missing timestamp_utc"))
                })?
                .as_str()
                .ok_or_else(|| {
                    LoggerError::Validation(format!(
                        "sample {index}: timestamp_utc must be a string"
                    ))
                })?;
            is_iso8601_utc(timestamp)
                .map_err(|e| LoggerError::Validation(format!("sample {index}: {e}")))?;
        }
    }

    Ok(())
}
