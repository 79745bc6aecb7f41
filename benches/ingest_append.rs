//! Criterion benchmarks for the ingestion hot path.
//!
//! Every batch takes the shared session lock, re-reads the state file, locks the
//! device file and appends with one fsync'd write, so these numbers bound how many
//! device batches per second a single worker can absorb.
//!
//! Run with: cargo bench --bench ingest_append

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sensor_logger::messages::IngestRequest;
use sensor_logger::{LoggerConfig, LoggerService};
use serde_json::json;
use std::sync::Arc;
use std::thread;

fn request(device_id: &str, batch_len: usize) -> IngestRequest {
    let samples: Vec<_> = (0..batch_len)
        .map(|i| json!({"sensor_time_ms": i, "distance_mm": 100 + i % 50, "status": "ok"}))
        .collect();
    serde_json::from_value(json!({"device_id": device_id, "samples": samples})).unwrap()
}

/// Single-threaded append throughput for several batch sizes.
fn ingest_batch_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest_append");

    for batch_len in [1usize, 10, 100, 1000] {
        let temp_dir = tempfile::tempdir().unwrap();
        let svc = LoggerService::new(&LoggerConfig::with_data_dir(temp_dir.path())).unwrap();
        svc.start_session().unwrap();
        let req = request("tof_01", batch_len);

        group.throughput(Throughput::Elements(batch_len as u64));
        group.bench_with_input(BenchmarkId::new("batch", batch_len), &batch_len, |b, _| {
            b.iter(|| {
                black_box(svc.ingest_batch(black_box(&req)).unwrap());
            });
        });
    }

    group.finish();
}

/// Several threads appending to distinct devices versus the same device.
fn ingest_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest_concurrent");
    const THREADS: usize = 4;
    const BATCH_LEN: usize = 50;

    for shared_device in [false, true] {
        let temp_dir = tempfile::tempdir().unwrap();
        let svc = Arc::new(LoggerService::new(&LoggerConfig::with_data_dir(temp_dir.path())).unwrap());
        svc.start_session().unwrap();
        let name = if shared_device { "same_device" } else { "distinct_devices" };

        group.throughput(Throughput::Elements((THREADS * BATCH_LEN) as u64));
        group.bench_function(name, |b| {
            b.iter(|| {
                let handles: Vec<_> = (0..THREADS)
                    .map(|t| {
                        let svc = Arc::clone(&svc);
                        let device = if shared_device {
                            "imu_01".to_string()
                        } else {
                            format!("imu_{t:02}")
                        };
                        thread::spawn(move || svc.ingest_batch(&request(&device, BATCH_LEN)).unwrap())
                    })
                    .collect();
                for handle in handles {
                    black_box(handle.join().unwrap());
                }
            });
        });
    }

    group.finish();
}

/// Cost of a stop: commit plus zipping a session with a few populated devices.
fn stop_and_archive(c: &mut Criterion) {
    let temp_dir = tempfile::tempdir().unwrap();
    let svc = LoggerService::new(&LoggerConfig::with_data_dir(temp_dir.path())).unwrap();
    let session = svc.start_session().unwrap();
    for device in ["tof_01", "tof_02", "imu_01"] {
        for _ in 0..20 {
            svc.ingest_batch(&request(device, 100)).unwrap();
        }
    }
    svc.stop_session().unwrap();

    c.bench_function("archive_session", |b| {
        b.iter(|| black_box(svc.archive_session(&session.session_id).unwrap()));
    });
}

criterion_group!(benches, ingest_batch_sizes, ingest_concurrent, stop_and_archive);
criterion_main!(benches);
