//! Durable session state with atomic replace and advisory locking.
//!
//! The state lives in a small JSON file. Saves go through a temp file in the
//! same directory followed by a rename, so a reader in any process sees either
//! the previous record or the new one. Transitions are serialized with an
//! `fs2` flock on a sibling `.lock` file.

use super::SessionState;
use crate::error::{AppResult, LoggerError};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Handle to the durable session state file.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    lock_path: PathBuf,
    corrupt_reads: AtomicU64,
}

/// An advisory lock on the state file. Released when dropped.
#[derive(Debug)]
pub struct StateLock {
    _file: File,
}

impl StateStore {
    /// Creates a handle for the state file at `path`. Nothing is touched on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self {
            path,
            lock_path,
            corrupt_reads: AtomicU64::new(0),
        }
    }

    /// Location of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of loads that fell back to the inactive default because the file was
    /// unreadable or corrupt.
    pub fn corrupt_reads(&self) -> u64 {
        self.corrupt_reads.load(Ordering::Relaxed)
    }

    /// Loads the current state.
    ///
    /// Never fails: a missing or empty file is the inactive default, and an
    /// unreadable or corrupt one degrades to it as well (logged and counted).
    pub fn load(&self) -> SessionState {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return SessionState::inactive(),
            Err(e) => return self.degraded(&e.to_string()),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return SessionState::inactive();
        }

        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => self.degraded(&e.to_string()),
        }
    }

    /// Replaces the persisted state atomically.
    pub fn save(&self, state: &SessionState) -> AppResult<()> {
        let parent = self.parent_dir();
        fs::create_dir_all(parent)?;

        let json = serde_json::to_vec_pretty(state)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".state-")
            .suffix(".tmp")
            .tempfile_in(parent)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| LoggerError::Io(e.error))?;

        debug!(path = %self.path.display(), active = state.active, "session state saved");
        Ok(())
    }

    /// Blocks until this caller holds the exclusive transition lock.
    pub fn lock_exclusive(&self) -> AppResult<StateLock> {
        let file = self.open_lock_file()?;
        FileExt::lock_exclusive(&file)
            .map_err(|e| LoggerError::Lock(format!("{}: {e}", self.lock_path.display())))?;
        Ok(StateLock { _file: file })
    }

    /// Blocks until this caller holds a shared lock. Shared holders exclude
    /// transitions but not each other.
    pub fn lock_shared(&self) -> AppResult<StateLock> {
        let file = self.open_lock_file()?;
        FileExt::lock_shared(&file)
            .map_err(|e| LoggerError::Lock(format!("{}: {e}", self.lock_path.display())))?;
        Ok(StateLock { _file: file })
    }

    fn open_lock_file(&self) -> AppResult<File> {
        fs::create_dir_all(self.parent_dir())?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?;
        Ok(file)
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn degraded(&self, reason: &str) -> SessionState {
        let count = self.corrupt_reads.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            path = %self.path.display(),
            corrupt_reads = count,
            "session state unreadable, treating as inactive: {reason}"
        );
        SessionState::inactive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn store_in(dir: &TempDir) -> StateStore {
        StateStore::new(dir.path().join("state.json"))
    }

    #[test]
    fn missing_file_is_inactive() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.load(), SessionState::inactive());
        assert_eq!(store.corrupt_reads(), 0);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let state = SessionState::started("20240501_120000", 1_714_564_800);

        store.save(&state).unwrap();
        assert_eq!(store.load(), state);

        // A second handle (another worker) sees the same record.
        assert_eq!(store_in(&dir).load(), state);
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        for epoch in 0..5 {
            store
                .save(&SessionState::started(format!("id{epoch}"), epoch))
                .unwrap();
        }

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["state.json".to_string()]);
    }

    #[test]
    #[traced_test]
    fn corrupt_file_degrades_to_inactive() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), b"{\"active\": tru").unwrap();

        assert_eq!(store.load(), SessionState::inactive());
        assert_eq!(store.corrupt_reads(), 1);
        assert!(logs_contain("session state unreadable"));
    }

    #[test]
    fn empty_file_is_inactive_without_counting() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), b"  \n").unwrap();
        assert_eq!(store.load(), SessionState::inactive());
        assert_eq!(store.corrupt_reads(), 0);
    }

    #[test]
    fn partial_record_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), br#"{"active": false}"#).unwrap();
        assert_eq!(store.load(), SessionState::inactive());
    }

    #[test]
    fn lock_file_sits_next_to_state() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let _guard = store.lock_exclusive().unwrap();
        assert!(dir.path().join("state.json.lock").exists());
    }

    #[test]
    fn shared_locks_coexist() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let first = store.lock_shared().unwrap();
        let second = store.lock_shared().unwrap();
        drop(first);
        drop(second);
        // Exclusive lock is obtainable once shared holders are gone.
        let _exclusive = store.lock_exclusive().unwrap();
    }
}
