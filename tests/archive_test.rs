//! Integration tests for session archives delivered on stop.

use sensor_logger::data::EMPTY_SESSION_MARKER;
use sensor_logger::messages::{IngestRequest, StopStatus};
use sensor_logger::{LoggerConfig, LoggerError, LoggerService};
use serde_json::json;
use std::io::{Cursor, Read};
use tempfile::TempDir;
use zip::ZipArchive;

fn service(dir: &TempDir) -> LoggerService {
    LoggerService::new(&LoggerConfig::with_data_dir(dir.path())).unwrap()
}

fn batch(device_id: &str, samples: serde_json::Value) -> IngestRequest {
    serde_json::from_value(json!({"device_id": device_id, "samples": samples})).unwrap()
}

fn entry_names(archive: &ZipArchive<Cursor<Vec<u8>>>) -> Vec<String> {
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

#[test]
fn test_archive_holds_every_device_file() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    let started = svc.start_session().unwrap();

    svc.ingest_batch(&batch("tof_01", json!([{"distance_mm": 120}, {"distance_mm": 121}])))
        .unwrap();
    svc.ingest_batch(&batch("tof_02", json!([{"distance_mm": 300}])))
        .unwrap();

    let stopped = svc.stop_session().unwrap();
    assert_eq!(stopped.status, StopStatus::Stopped);
    assert_eq!(stopped.session_id.as_deref(), Some(started.session_id.as_str()));
    assert_eq!(
        stopped.archive_filename,
        Some(format!("session_{}.zip", started.session_id))
    );

    let mut archive = ZipArchive::new(Cursor::new(stopped.archive.unwrap())).unwrap();
    assert_eq!(entry_names(&archive), vec!["tof_01.csv", "tof_02.csv"]);

    let mut archived = String::new();
    archive
        .by_name("tof_01.csv")
        .unwrap()
        .read_to_string(&mut archived)
        .unwrap();
    let on_disk = std::fs::read_to_string(
        dir.path().join(&started.session_id).join("tof_01.csv"),
    )
    .unwrap();
    assert_eq!(archived, on_disk);
    assert_eq!(archived.lines().count(), 3);
}

#[test]
fn test_empty_session_archive_has_placeholder_only() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    svc.start_session().unwrap();

    let stopped = svc.stop_session().unwrap();
    let archive = ZipArchive::new(Cursor::new(stopped.archive.unwrap())).unwrap();
    assert_eq!(entry_names(&archive), vec![EMPTY_SESSION_MARKER]);
}

#[test]
fn test_finished_session_can_be_archived_again() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    let started = svc.start_session().unwrap();
    svc.ingest_batch(&batch("imu_01", json!([{"ax": 0.1, "ay": 0.2}])))
        .unwrap();
    svc.stop_session().unwrap();

    // Another worker rebuilds the same archive from the data directory.
    let other = service(&dir);
    let bytes = other.archive_session(&started.session_id).unwrap();
    let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    assert_eq!(entry_names(&archive), vec!["imu_01.csv"]);
}

#[test]
fn test_archive_lookup_rejects_unknown_and_running_sessions() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let err = svc.archive_session("20000101_000000").unwrap_err();
    assert!(matches!(err, LoggerError::Validation(_)));

    let started = svc.start_session().unwrap();
    let err = svc.archive_session(&started.session_id).unwrap_err();
    assert!(err.to_string().contains("still active"));
}
