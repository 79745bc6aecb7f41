//! Zip packaging of a finished session.
//!
//! The archiver only reads: it must run after the coordinator has committed the
//! stop, so no device file is mid-append while it is copied.

use crate::error::AppResult;
use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Entry written when a session holds no device files.
pub const EMPTY_SESSION_MARKER: &str = "EMPTY_SESSION.txt";

const EMPTY_SESSION_NOTE: &str =
    "No device data was recorded during this session.\n";

/// File name under which a session archive is delivered.
pub fn archive_file_name(session_id: &str) -> String {
    format!("session_{session_id}.zip")
}

/// What ended up in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Entry names in archive order
    pub entries: Vec<String>,
    /// True when the session had no device files and the marker was written
    pub empty: bool,
}

/// Bundles a session directory's device files into a zip archive.
#[derive(Debug, Clone)]
pub struct SessionArchiver {
    extension: String,
}

impl SessionArchiver {
    /// Creates an archiver picking up files with the given extension.
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    /// Device files of a session, sorted by name. A missing directory has none.
    pub fn device_files(&self, session_dir: &Path) -> AppResult<Vec<PathBuf>> {
        let entries = match fs::read_dir(session_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(self.extension.as_str()) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Writes the archive for `session_dir` into `writer`.
    pub fn write_archive<W: Write + Seek>(
        &self,
        session_dir: &Path,
        writer: W,
    ) -> AppResult<ArchiveSummary> {
        let files = self.device_files(session_dir)?;
        let mut zip = ZipWriter::new(writer);
        let mut entries = Vec::with_capacity(files.len().max(1));

        if files.is_empty() {
            zip.start_file(EMPTY_SESSION_MARKER, entry_options(false))?;
            zip.write_all(EMPTY_SESSION_NOTE.as_bytes())?;
            entries.push(EMPTY_SESSION_MARKER.to_string());
        }

        for path in &files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut source = File::open(path)?;
            let large = source.metadata()?.len() >= u64::from(u32::MAX);
            zip.start_file(name.as_str(), entry_options(large))?;
            io::copy(&mut source, &mut zip)?;
            debug!(entry = %name, "added to archive");
            entries.push(name);
        }

        zip.finish()?;
        info!(
            session_dir = %session_dir.display(),
            entries = entries.len(),
            "session archived"
        );
        Ok(ArchiveSummary {
            empty: files.is_empty(),
            entries,
        })
    }

    /// Builds the archive in memory.
    pub fn archive_bytes(&self, session_dir: &Path) -> AppResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_archive(session_dir, &mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Streams the archive to a file instead of memory.
    pub fn archive_to_file(&self, session_dir: &Path, output: &Path) -> AppResult<ArchiveSummary> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(output)?);
        let summary = self.write_archive(session_dir, &mut writer)?;
        writer.flush()?;
        Ok(summary)
    }
}

fn entry_options(large_file: bool) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(large_file)
}
