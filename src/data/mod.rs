//! Device data storage: the per-device append sink and the session archiver.
pub mod archive;
pub mod sink;

pub use archive::{archive_file_name, ArchiveSummary, SessionArchiver, EMPTY_SESSION_MARKER};
pub use sink::{DeviceDataSink, IgnoreReason, IngestOutcome};
