//! Per-device CSV append path.
//!
//! Every device gets one file per session, `<session_dir>/<device_id>.<ext>`,
//! with the header `server_time_utc,device_id,<schema...>`. The schema is fixed
//! by the sorted keys of the first sample the device ever sent in that session;
//! later samples are projected onto it (missing keys become empty cells, extra
//! keys are dropped).
//!
//! A call's rows are encoded into one buffer and written with a single
//! `write_all` on an append-mode handle, while holding a per-file mutex (threads
//! in this process) and an exclusive `fs2` lock on the data file (other
//! processes). Appends to different devices never wait on each other.

use crate::config::LoggerConfig;
use crate::error::{AppResult, LoggerError};
use crate::session::{ActiveSession, SessionCoordinator};
use crate::Sample;
use chrono::{DateTime, SecondsFormat, Utc};
use fs2::FileExt;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, warn};

/// Leading columns of every device file.
pub const HEADER_PREFIX: [&str; 2] = ["server_time_utc", "device_id"];

/// Directory under the data root that receives orphaned batches.
pub const ORPHAN_DIR: &str = "_orphaned";

/// Why a batch was accepted without being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No session is running.
    NotLogging,
    /// A session is running but its directory could not be used.
    SessionUnavailable,
}

impl IgnoreReason {
    /// Wire name of the reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::NotLogging => "not_logging",
            IgnoreReason::SessionUnavailable => "session_unavailable",
        }
    }
}

/// Result of one ingestion call. Ingestion never fails the caller; storage
/// problems are reported as [`IngestOutcome::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The batch was empty; nothing was touched.
    Empty,
    /// Rows were appended to the device's session file.
    Written {
        /// Rows appended
        written: usize,
        /// File that received them
        path: PathBuf,
    },
    /// Rows were appended to the orphan file outside any session.
    Orphaned {
        /// Rows appended
        written: usize,
        /// File that received them
        path: PathBuf,
    },
    /// The batch was discarded.
    Ignored {
        /// Why
        reason: IgnoreReason,
    },
    /// Storage failed after one local retry.
    Failed {
        /// Error description
        error: String,
    },
}

impl IngestOutcome {
    /// Number of rows persisted by the call.
    pub fn written(&self) -> usize {
        match self {
            IngestOutcome::Written { written, .. } | IngestOutcome::Orphaned { written, .. } => {
                *written
            }
            _ => 0,
        }
    }
}

#[derive(Debug, Default)]
struct DeviceFile {
    schema: Mutex<Option<Vec<String>>>,
}

/// Writes device batches into the active session.
#[derive(Debug)]
pub struct DeviceDataSink {
    coordinator: Arc<SessionCoordinator>,
    extension: String,
    orphan_capture: bool,
    files: Mutex<HashMap<PathBuf, Arc<DeviceFile>>>,
}

impl DeviceDataSink {
    /// Creates a sink writing `<device>.<extension>` files.
    pub fn new(
        coordinator: Arc<SessionCoordinator>,
        extension: impl Into<String>,
        orphan_capture: bool,
    ) -> Self {
        Self {
            coordinator,
            extension: extension.into(),
            orphan_capture,
            files: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a sink configured from `config`.
    pub fn from_config(coordinator: Arc<SessionCoordinator>, config: &LoggerConfig) -> Self {
        Self::new(
            coordinator,
            config.storage.file_extension.clone(),
            config.ingest.orphan_capture,
        )
    }

    /// File name used for a device.
    pub fn file_name(&self, device_id: &str) -> String {
        format!("{device_id}.{}", self.extension)
    }

    /// Appends `samples` for `device_id` to the running session.
    pub fn ingest(&self, device_id: &str, samples: &[Sample]) -> IngestOutcome {
        if samples.is_empty() {
            return IngestOutcome::Empty;
        }

        let received_at = Utc::now();
        let result = self.coordinator.with_active_session(|session| {
            self.append_to_session(session, device_id, samples, received_at)
        });

        match result {
            Ok(Some(Ok(outcome))) => {
                debug!(device_id, written = outcome.written(), "batch ingested");
                outcome
            }
            Ok(None) => IngestOutcome::Ignored {
                reason: IgnoreReason::NotLogging,
            },
            Ok(Some(Err(e))) | Err(e) => {
                error!(device_id, "failed to persist batch: {e}");
                IngestOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Forgets cached schemas for files under `session_dir`.
    pub fn release_session(&self, session_dir: &Path) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|path, _| !path.starts_with(session_dir));
    }

    fn append_to_session(
        &self,
        session: &ActiveSession,
        device_id: &str,
        samples: &[Sample],
        received_at: DateTime<Utc>,
    ) -> AppResult<IngestOutcome> {
        let path = session.directory.join(self.file_name(device_id));

        // Only a failed open is retried.
        let file = match open_append(&path) {
            Ok(file) => file,
            Err(e) => {
                warn!(
                    session_id = %session.session_id,
                    device_id,
                    "device file unavailable, recreating session directory: {e}"
                );
                if let Err(e) = fs::create_dir_all(&session.directory) {
                    return self.session_unavailable(device_id, samples, received_at, &e);
                }
                open_append(&path)?
            }
        };

        let written = self.append_rows(file, &path, device_id, samples, received_at)?;
        Ok(IngestOutcome::Written { written, path })
    }

    fn session_unavailable(
        &self,
        device_id: &str,
        samples: &[Sample],
        received_at: DateTime<Utc>,
        cause: &std::io::Error,
    ) -> AppResult<IngestOutcome> {
        if !self.orphan_capture {
            warn!(device_id, "session directory unavailable, discarding batch: {cause}");
            return Ok(IngestOutcome::Ignored {
                reason: IgnoreReason::SessionUnavailable,
            });
        }

        let orphan_dir = self.coordinator.data_dir().join(ORPHAN_DIR);
        fs::create_dir_all(&orphan_dir)?;
        let path = orphan_dir.join(self.file_name(device_id));
        let file = open_append(&path)?;
        let written = self.append_rows(file, &path, device_id, samples, received_at)?;
        warn!(
            device_id,
            path = %path.display(),
            "session directory unavailable, batch written to orphan file: {cause}"
        );
        Ok(IngestOutcome::Orphaned { written, path })
    }

    fn device_file(&self, path: &Path) -> Arc<DeviceFile> {
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(files.entry(path.to_path_buf()).or_default())
    }

    fn append_rows(
        &self,
        mut file: File,
        path: &Path,
        device_id: &str,
        samples: &[Sample],
        received_at: DateTime<Utc>,
    ) -> AppResult<usize> {
        let entry = self.device_file(path);
        let mut cached_schema = entry.schema.lock().unwrap_or_else(PoisonError::into_inner);

        FileExt::lock_exclusive(&file)
            .map_err(|e| LoggerError::Lock(format!("{}: {e}", path.display())))?;

        // The header follows the file, not the cache: a recreated file starts empty.
        let needs_header = file.metadata()?.len() == 0;
        let schema = match (cached_schema.as_ref(), needs_header) {
            (Some(schema), _) => schema.clone(),
            (None, false) => read_schema(path)?,
            (None, true) => schema_of(&samples[0]),
        };

        let buffer = encode_rows(&schema, needs_header, device_id, samples, received_at)?;
        file.write_all(&buffer)?;
        file.sync_data()?;

        *cached_schema = Some(schema);
        Ok(samples.len())
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Sorted field names of a sample.
pub fn schema_of(sample: &Sample) -> Vec<String> {
    let mut fields: Vec<String> = sample.keys().cloned().collect();
    fields.sort();
    fields
}

/// Renders one cell. Absent and `null` values are empty.
pub fn render_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn read_schema(path: &Path) -> AppResult<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut header = csv::StringRecord::new();
    if !reader.read_record(&mut header)? {
        return Ok(Vec::new());
    }
    Ok(header
        .iter()
        .skip(HEADER_PREFIX.len())
        .map(str::to_string)
        .collect())
}

fn encode_rows(
    schema: &[String],
    with_header: bool,
    device_id: &str,
    samples: &[Sample],
    received_at: DateTime<Utc>,
) -> AppResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    if with_header {
        writer.write_record(
            HEADER_PREFIX
                .iter()
                .copied()
                .chain(schema.iter().map(String::as_str)),
        )?;
    }

    let stamp = received_at.to_rfc3339_opts(SecondsFormat::Micros, true);
    let mut record = Vec::with_capacity(schema.len() + HEADER_PREFIX.len());
    for sample in samples {
        record.clear();
        record.push(stamp.clone());
        record.push(device_id.to_string());
        record.extend(schema.iter().map(|field| render_value(sample.get(field))));
        writer.write_record(&record)?;
    }

    Ok(writer.into_inner()?)
}
