//! The session state machine.
//!
//! `SessionCoordinator` owns the Inactive/Active transitions. Transitions run
//! inside a critical section made of two layers: a process-local `RwLock`
//! (write side) and the state store's exclusive flock, so the
//! at-most-one-active-session rule holds across every process sharing the data
//! directory. Ingestion enters the same section on the shared side through
//! [`SessionCoordinator::with_active_session`], which keeps an append and a
//! concurrent stop from overlapping.
//!
//! The coordinator keeps a best-effort copy of the last state it read. That copy
//! only feeds status reporting; every decision re-reads the durable store.

use super::{session_id_for, ActiveSession, SessionState, StateStore, StoppedSession};
use crate::error::AppResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

/// Result of a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session was created.
    Started(ActiveSession),
    /// A session was already running; it is returned unchanged.
    AlreadyRunning(ActiveSession),
}

impl StartOutcome {
    /// The session that is running after the request.
    pub fn session(&self) -> &ActiveSession {
        match self {
            StartOutcome::Started(session) | StartOutcome::AlreadyRunning(session) => session,
        }
    }
}

/// Result of a stop request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The session was closed; its files are ready for archiving.
    Stopped(StoppedSession),
    /// Nothing was running.
    NoActiveSession,
}

/// What polling devices need to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Whether devices should transmit
    pub logging: bool,
    /// UTC seconds when the running session began, `0` when idle
    pub start_epoch: i64,
}

/// Serializes session transitions and resolves the active session for writers.
#[derive(Debug)]
pub struct SessionCoordinator {
    store: StateStore,
    data_dir: PathBuf,
    gate: RwLock<()>,
    cache: RwLock<SessionState>,
}

impl SessionCoordinator {
    /// Creates a coordinator over `store`, placing session directories in `data_dir`.
    pub fn new(store: StateStore, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            data_dir: data_dir.into(),
            gate: RwLock::new(()),
            cache: RwLock::new(SessionState::inactive()),
        }
    }

    /// Root directory holding all sessions.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The durable store behind this coordinator.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Directory of the session with the given id.
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.data_dir.join(session_id)
    }

    /// Starts a session unless one is already running.
    ///
    /// Idempotent: a second start reports the running session instead of failing.
    pub fn start(&self) -> AppResult<StartOutcome> {
        let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        let _lock = self.store.lock_exclusive()?;

        let current = self.refresh();
        if let Some(session) = self.active_session(&current) {
            info!(session_id = %session.session_id, "start requested, session already running");
            return Ok(StartOutcome::AlreadyRunning(session));
        }

        let now = Utc::now();
        let session_id = session_id_for(now);
        let directory = self.session_dir(&session_id);
        fs::create_dir_all(&directory)?;

        let state = SessionState::started(session_id.clone(), now.timestamp());
        self.store.save(&state)?;
        self.remember(&state);

        info!(
            session_id = %session_id,
            directory = %directory.display(),
            "logging session started"
        );
        Ok(StartOutcome::Started(ActiveSession {
            session_id,
            start_epoch: state.start_epoch,
            directory,
        }))
    }

    /// Stops the running session.
    ///
    /// The Inactive state is committed before this returns, and the lock is
    /// released before any archiving the caller does afterwards.
    pub fn stop(&self) -> AppResult<StopOutcome> {
        let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        let _lock = self.store.lock_exclusive()?;

        let current = self.refresh();
        let Some(session_id) = current.running().map(|(id, _)| id.to_string()) else {
            info!("stop requested with no active session");
            return Ok(StopOutcome::NoActiveSession);
        };

        let inactive = SessionState::inactive();
        self.store.save(&inactive)?;
        self.remember(&inactive);

        let directory = self.session_dir(&session_id);
        info!(session_id = %session_id, "logging session stopped");
        Ok(StopOutcome::Stopped(StoppedSession {
            session_id,
            start_epoch: current.start_epoch,
            directory,
        }))
    }

    /// Directory of the running session, read fresh from the durable store.
    pub fn resolve_active_directory(&self) -> Option<PathBuf> {
        let state = self.refresh();
        self.active_session(&state).map(|session| session.directory)
    }

    /// The running session, read fresh from the durable store.
    pub fn current_session(&self) -> Option<ActiveSession> {
        let state = self.refresh();
        self.active_session(&state)
    }

    /// Runs `f` against the running session while holding the shared side of the
    /// transition lock. Returns `Ok(None)` without calling `f` when nothing is running.
    ///
    /// A stop cannot commit while `f` runs, so anything `f` writes is in place
    /// before the session is handed to the archiver.
    pub fn with_active_session<R>(
        &self,
        f: impl FnOnce(&ActiveSession) -> R,
    ) -> AppResult<Option<R>> {
        let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        let _lock = self.store.lock_shared()?;

        let state = self.refresh();
        match self.active_session(&state) {
            Some(session) => Ok(Some(f(&session))),
            None => {
                debug!("no active session");
                Ok(None)
            }
        }
    }

    /// Read-only projection for polling clients, always from the durable store.
    pub fn config(&self) -> LoggingConfig {
        let state = self.refresh();
        match state.running() {
            Some((_, start_epoch)) => LoggingConfig {
                logging: true,
                start_epoch,
            },
            None => LoggingConfig {
                logging: false,
                start_epoch: 0,
            },
        }
    }

    /// Last state this worker observed. May be stale.
    pub fn cached_state(&self) -> SessionState {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn refresh(&self) -> SessionState {
        let state = self.store.load();
        self.remember(&state);
        state
    }

    fn remember(&self, state: &SessionState) {
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = state.clone();
    }

    fn active_session(&self, state: &SessionState) -> Option<ActiveSession> {
        state.running().map(|(id, start_epoch)| ActiveSession {
            session_id: id.to_string(),
            start_epoch,
            directory: self.session_dir(id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    fn coordinator(dir: &TempDir) -> SessionCoordinator {
        SessionCoordinator::new(
            StateStore::new(dir.path().join("state.json")),
            dir.path(),
        )
    }

    #[test]
    fn start_creates_directory_and_persists() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir);

        let outcome = coord.start().unwrap();
        let StartOutcome::Started(session) = outcome else {
            panic!("expected a new session, got {outcome:?}");
        };
        assert!(session.directory.is_dir());
        assert_eq!(session.directory, dir.path().join(&session.session_id));

        let state = coord.store().load();
        assert!(state.active);
        assert_eq!(state.session_id.as_deref(), Some(session.session_id.as_str()));
        assert_eq!(state.start_epoch, session.start_epoch);
    }

    #[test]
    fn second_start_reports_running_session() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir);

        let first = coord.start().unwrap();
        let second = coord.start().unwrap();
        assert!(matches!(second, StartOutcome::AlreadyRunning(_)));
        assert_eq!(first.session(), second.session());
    }

    #[test]
    fn stop_then_stop_again() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir);
        let started = coord.start().unwrap();

        let StopOutcome::Stopped(stopped) = coord.stop().unwrap() else {
            panic!("expected the running session to stop");
        };
        assert_eq!(stopped.session_id, started.session().session_id);
        assert_eq!(stopped.directory, started.session().directory);

        assert_eq!(coord.stop().unwrap(), StopOutcome::NoActiveSession);
        assert_eq!(coord.store().load(), SessionState::inactive());
    }

    #[test]
    fn config_tracks_durable_state() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir);
        assert_eq!(
            coord.config(),
            LoggingConfig {
                logging: false,
                start_epoch: 0
            }
        );

        let started = coord.start().unwrap();
        let config = coord.config();
        assert!(config.logging);
        assert_eq!(config.start_epoch, started.session().start_epoch);

        coord.stop().unwrap();
        assert!(!coord.config().logging);
    }

    #[test]
    fn other_worker_sees_start_immediately() {
        let dir = TempDir::new().unwrap();
        let worker_a = coordinator(&dir);
        let worker_b = coordinator(&dir);

        // Prime B's cache with the idle state.
        assert!(!worker_b.config().logging);

        let started = worker_a.start().unwrap();
        let config = worker_b.config();
        assert!(config.logging);
        assert_eq!(config.start_epoch, started.session().start_epoch);
        assert_eq!(
            worker_b.resolve_active_directory(),
            Some(started.session().directory.clone())
        );
    }

    #[test]
    fn cache_follows_reads() {
        let dir = TempDir::new().unwrap();
        let worker_a = coordinator(&dir);
        let worker_b = coordinator(&dir);

        worker_a.start().unwrap();
        assert!(!worker_b.cached_state().active);
        worker_b.config();
        assert!(worker_b.cached_state().active);
    }

    #[test]
    fn with_active_session_skips_when_idle() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir);
        let mut called = false;
        let result = coord.with_active_session(|_| called = true).unwrap();
        assert!(result.is_none());
        assert!(!called);

        coord.start().unwrap();
        let id = coord
            .with_active_session(|session| session.session_id.clone())
            .unwrap();
        assert_eq!(id, coord.cached_state().session_id);
    }

    #[test]
    fn concurrent_starts_yield_one_session() {
        let dir = TempDir::new().unwrap();
        let coord = Arc::new(coordinator(&dir));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let coord = Arc::clone(&coord);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    coord.start().unwrap()
                })
            })
            .collect();

        let outcomes: Vec<StartOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let started = outcomes
            .iter()
            .filter(|o| matches!(o, StartOutcome::Started(_)))
            .count();
        assert_eq!(started, 1);

        let id = &outcomes[0].session().session_id;
        assert!(outcomes.iter().all(|o| &o.session().session_id == id));
    }
}
