//! Session lifecycle for the logger.
//!
//! A "session" is a bounded period during which device data is accepted and
//! persisted. Exactly one fact decides whether a session is running: the
//! [`SessionState`] record held by the [`StateStore`]. Every worker, in this
//! process or another one sharing the same data directory, reads that record
//! instead of trusting anything it remembers.
//!
//! ## Pieces
//!
//! - **`state_store`**: the durable singleton record, with atomic replace-on-save
//!   and an inter-process advisory lock.
//! - **`coordinator`**: the start/stop state machine. It serializes transitions,
//!   generates session ids and tells the ingestion path where to write.
//!
//! Session ids are UTC timestamps with one-second granularity (`20240501_120000`),
//! which double as the name of the session's directory.

pub mod coordinator;
pub mod state_store;

pub use coordinator::{LoggingConfig, SessionCoordinator, StartOutcome, StopOutcome};
pub use state_store::{StateLock, StateStore};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `strftime` pattern used to derive session ids.
pub const SESSION_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// The durable "is logging active, which session, since when" record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    /// Whether logging is currently enabled.
    pub active: bool,
    /// Folder-friendly session id; present iff `active`.
    pub session_id: Option<String>,
    /// UTC seconds when the session began, `0` when inactive.
    pub start_epoch: i64,
}

impl SessionState {
    /// The inactive default.
    pub fn inactive() -> Self {
        Self::default()
    }

    /// A freshly started session.
    pub fn started(session_id: impl Into<String>, start_epoch: i64) -> Self {
        Self {
            active: true,
            session_id: Some(session_id.into()),
            start_epoch,
        }
    }

    /// Returns the running session's id and start epoch, if any.
    pub fn running(&self) -> Option<(&str, i64)> {
        match (&self.session_id, self.active) {
            (Some(id), true) => Some((id.as_str(), self.start_epoch)),
            _ => None,
        }
    }
}

/// A session as seen while it is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    /// Session id
    pub session_id: String,
    /// UTC seconds when the session began
    pub start_epoch: i64,
    /// Directory holding the session's device files
    pub directory: PathBuf,
}

impl ActiveSession {
    /// Start time as an RFC 3339 UTC string, e.g. `2024-05-01T12:00:00Z`.
    pub fn start_time_utc(&self) -> String {
        epoch_to_rfc3339(self.start_epoch)
    }
}

/// A session that has just been closed by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoppedSession {
    /// Session id
    pub session_id: String,
    /// UTC seconds when the session began
    pub start_epoch: i64,
    /// Directory holding the session's device files
    pub directory: PathBuf,
}

/// Derives the session id for a start time.
pub fn session_id_for(started_at: DateTime<Utc>) -> String {
    started_at.format(SESSION_ID_FORMAT).to_string()
}

/// Returns true if `candidate` has the shape of a generated session id.
pub fn is_session_id(candidate: &str) -> bool {
    candidate.len() == 15
        && candidate.char_indices().all(|(i, c)| {
            if i == 8 {
                c == '_'
            } else {
                c.is_ascii_digit()
            }
        })
}

pub(crate) fn epoch_to_rfc3339(epoch: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}
