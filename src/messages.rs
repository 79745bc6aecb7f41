//! Request and response shapes exchanged with the boundary.
//!
//! These are plain serde types; the HTTP layer serializes them as JSON and the
//! CLI pretty-prints them.

use crate::data::{IgnoreReason, IngestOutcome};
use crate::Sample;
use serde::{Deserialize, Serialize};

/// Outcome label of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartStatus {
    /// A new session was created
    Started,
    /// A session was already running
    AlreadyRunning,
}

/// Response to `StartSession`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartResponse {
    /// started | already_running
    pub status: StartStatus,
    /// Running session id
    pub session_id: String,
    /// UTC seconds when the session began
    pub start_epoch: i64,
    /// RFC 3339 start time
    pub start_time_utc: String,
}

/// Outcome label of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    /// The session was closed and archived
    Stopped,
    /// Nothing was running
    NoActiveSession,
}

/// Response to `StopSession`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopResponse {
    /// stopped | no_active_session
    pub status: StopStatus,
    /// Closed session id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// `session_<id>.zip`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_filename: Option<String>,
    /// Zip archive of the session's device files
    #[serde(skip)]
    pub archive: Option<Vec<u8>>,
}

impl StopResponse {
    /// Response for a stop with nothing running.
    pub fn no_active_session() -> Self {
        Self {
            status: StopStatus::NoActiveSession,
            session_id: None,
            archive_filename: None,
            archive: None,
        }
    }
}

/// Response to `GetConfig`, polled by devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigResponse {
    /// Whether devices should transmit
    pub logging: bool,
    /// UTC seconds when the running session began, `0` when idle
    pub start_epoch: i64,
}

/// A device batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Submitting device
    pub device_id: String,
    /// Ordered samples, each a field -> scalar map
    pub samples: Vec<Sample>,
}

/// Outcome label of an ingestion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// Rows persisted (possibly zero for an empty batch)
    Ok,
    /// Accepted and discarded
    Ignored,
    /// Storage failed
    Error,
}

/// Response to `IngestBatch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    /// ok | ignored | error
    pub status: IngestStatus,
    /// Rows persisted
    pub written: usize,
    /// Why nothing (or an orphan file) was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&IngestOutcome> for IngestResponse {
    fn from(outcome: &IngestOutcome) -> Self {
        let (status, reason) = match outcome {
            IngestOutcome::Empty | IngestOutcome::Written { .. } => (IngestStatus::Ok, None),
            IngestOutcome::Orphaned { .. } => (IngestStatus::Ok, Some("orphaned".to_string())),
            IngestOutcome::Ignored { reason } => {
                (IngestStatus::Ignored, Some(reason.as_str().to_string()))
            }
            IngestOutcome::Failed { error } => (IngestStatus::Error, Some(error.clone())),
        };
        Self {
            status,
            written: outcome.written(),
            reason,
        }
    }
}

impl IngestResponse {
    /// True when the batch was dropped because no session is running.
    pub fn is_not_logging(&self) -> bool {
        self.reason.as_deref() == Some(IgnoreReason::NotLogging.as_str())
    }
}

/// Operator view of the logger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Whether a session is running
    pub logging: bool,
    /// Running session id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// UTC seconds when the running session began, `0` when idle
    pub start_epoch: i64,
    /// RFC 3339 start time of the running session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time_utc: Option<String>,
    /// Devices with a file in the running session
    pub devices: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn ingest_request_parses_samples() {
        let request: IngestRequest = serde_json::from_value(json!({
            "device_id": "tof_01",
            "samples": [{"distance_mm": 100}, {"distance_mm": 101, "ok": true}]
        }))
        .unwrap();
        assert_eq!(request.device_id, "tof_01");
        assert_eq!(request.samples.len(), 2);

        let rejected = serde_json::from_value::<IngestRequest>(json!({
            "device_id": "tof_01",
            "samples": [1, 2]
        }));
        assert!(rejected.is_err());

        let missing = serde_json::from_value::<IngestRequest>(json!({"device_id": "tof_01"}));
        assert!(missing.is_err());
    }

    #[test]
    fn outcome_mapping() {
        let written = IngestOutcome::Written {
            written: 3,
            path: PathBuf::from("x.csv"),
        };
        let response = IngestResponse::from(&written);
        assert_eq!(response.status, IngestStatus::Ok);
        assert_eq!(response.written, 3);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"status": "ok", "written": 3})
        );

        let ignored = IngestResponse::from(&IngestOutcome::Ignored {
            reason: IgnoreReason::NotLogging,
        });
        assert!(ignored.is_not_logging());
        assert_eq!(
            serde_json::to_value(&ignored).unwrap(),
            json!({"status": "ignored", "written": 0, "reason": "not_logging"})
        );

        let failed = IngestResponse::from(&IngestOutcome::Failed {
            error: "disk full".into(),
        });
        assert_eq!(failed.status, IngestStatus::Error);
        assert_eq!(failed.written, 0);
    }

    #[test]
    fn stop_response_hides_archive_bytes() {
        let response = StopResponse {
            status: StopStatus::Stopped,
            session_id: Some("20240501_120000".into()),
            archive_filename: Some("session_20240501_120000.zip".into()),
            archive: Some(vec![1, 2, 3]),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "status": "stopped",
                "session_id": "20240501_120000",
                "archive_filename": "session_20240501_120000.zip"
            })
        );
        assert_eq!(
            serde_json::to_value(StopResponse::no_active_session()).unwrap(),
            json!({"status": "no_active_session"})
        );
    }
}
