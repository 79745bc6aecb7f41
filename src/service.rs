//! The logging service: the operations the boundary layers call.
//!
//! `LoggerService` wires one [`SessionCoordinator`], one [`DeviceDataSink`] and one
//! [`SessionArchiver`] together. It holds no hidden globals; share it with
//! `Arc` across request workers. Several services (in one process or many) can
//! point at the same data directory and will agree on the running session.

use crate::config::{IngestConfig, LoggerConfig};
use crate::data::{archive_file_name, DeviceDataSink, SessionArchiver};
use crate::error::{AppResult, LoggerError};
use crate::messages::{
    ConfigResponse, IngestRequest, IngestResponse, StartResponse, StartStatus, StatusResponse,
    StopResponse, StopStatus,
};
use crate::session::{is_session_id, SessionCoordinator, StartOutcome, StateStore, StopOutcome};
use crate::validation::validate_batch;
use std::fs;
use std::sync::Arc;
use tracing::info;

/// Session start/stop, device ingestion and archive retrieval.
#[derive(Debug)]
pub struct LoggerService {
    coordinator: Arc<SessionCoordinator>,
    sink: DeviceDataSink,
    archiver: SessionArchiver,
    policy: IngestConfig,
}

impl LoggerService {
    /// Builds the service for `config`, creating the data directory if needed.
    pub fn new(config: &LoggerConfig) -> AppResult<Self> {
        fs::create_dir_all(&config.storage.data_dir)?;

        let store = StateStore::new(config.storage.state_path());
        let coordinator = Arc::new(SessionCoordinator::new(
            store,
            config.storage.data_dir.clone(),
        ));
        let sink = DeviceDataSink::from_config(Arc::clone(&coordinator), config);
        let archiver = SessionArchiver::new(config.storage.file_extension.clone());

        info!(data_dir = %config.storage.data_dir.display(), "logger service ready");
        Ok(Self {
            coordinator,
            sink,
            archiver,
            policy: config.ingest.clone(),
        })
    }

    /// The session coordinator.
    pub fn coordinator(&self) -> &Arc<SessionCoordinator> {
        &self.coordinator
    }

    /// The session archiver.
    pub fn archiver(&self) -> &SessionArchiver {
        &self.archiver
    }

    /// `StartSession`
    pub fn start_session(&self) -> AppResult<StartResponse> {
        let outcome = self.coordinator.start()?;
        let status = match outcome {
            StartOutcome::Started(_) => StartStatus::Started,
            StartOutcome::AlreadyRunning(_) => StartStatus::AlreadyRunning,
        };
        let session = outcome.session();
        Ok(StartResponse {
            status,
            session_id: session.session_id.clone(),
            start_epoch: session.start_epoch,
            start_time_utc: session.start_time_utc(),
        })
    }

    /// `StopSession`: closes the running session and returns its archive.
    pub fn stop_session(&self) -> AppResult<StopResponse> {
        let stopped = match self.coordinator.stop()? {
            StopOutcome::Stopped(stopped) => stopped,
            StopOutcome::NoActiveSession => return Ok(StopResponse::no_active_session()),
        };

        self.sink.release_session(&stopped.directory);
        let archive = self.archiver.archive_bytes(&stopped.directory)?;
        Ok(StopResponse {
            status: StopStatus::Stopped,
            archive_filename: Some(archive_file_name(&stopped.session_id)),
            session_id: Some(stopped.session_id),
            archive: Some(archive),
        })
    }

    /// `GetConfig`
    pub fn get_config(&self) -> ConfigResponse {
        let config = self.coordinator.config();
        ConfigResponse {
            logging: config.logging,
            start_epoch: config.start_epoch,
        }
    }

    /// `IngestBatch`. Validation failures reject the whole batch; everything else
    /// is reported in the response.
    pub fn ingest_batch(&self, request: &IngestRequest) -> AppResult<IngestResponse> {
        validate_batch(&request.device_id, &request.samples, &self.policy)?;
        let outcome = self.sink.ingest(&request.device_id, &request.samples);
        Ok(IngestResponse::from(&outcome))
    }

    /// Running session and the devices that have reported in it.
    pub fn status(&self) -> AppResult<StatusResponse> {
        let Some(session) = self.coordinator.current_session() else {
            return Ok(StatusResponse {
                logging: false,
                session_id: None,
                start_epoch: 0,
                start_time_utc: None,
                devices: Vec::new(),
            });
        };

        let devices = self
            .archiver
            .device_files(&session.directory)?
            .iter()
            .filter_map(|path| path.file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .collect();

        Ok(StatusResponse {
            logging: true,
            start_time_utc: Some(session.start_time_utc()),
            session_id: Some(session.session_id),
            start_epoch: session.start_epoch,
            devices,
        })
    }

    /// Rebuilds the archive of a finished session.
    pub fn archive_session(&self, session_id: &str) -> AppResult<Vec<u8>> {
        if !is_session_id(session_id) {
            return Err(LoggerError::Validation(format!(
                "'{session_id}' is not a session id"
            )));
        }
        if let Some(active) = self.coordinator.current_session() {
            if active.session_id == session_id {
                return Err(LoggerError::Validation(format!(
                    "session {session_id} is still active"
                )));
            }
        }

        let directory = self.coordinator.session_dir(session_id);
        if !directory.is_dir() {
            return Err(LoggerError::Validation(format!(
                "unknown session {session_id}"
            )));
        }
        self.archiver.archive_bytes(&directory)
    }
}
