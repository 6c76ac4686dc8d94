//! Result logs persisted through the CSV file sink.

#![cfg(feature = "storage_csv")]

use rfid_probe::data::{CsvFileSink, ResultLog};
use rfid_probe::experiment::{RetrySession, ShutdownSignal, SweepPoint};
use rfid_probe::hardware::{SimulatedReader, SimulationConfig};
use rfid_probe::procedures::{inventory, ProcedureContext};
use rfid_probe::tag::TargetSpec;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn second_flush_leaves_file_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("turn_on_power.csv");
    let log = ResultLog::<SweepPoint>::new(&path, Arc::new(CsvFileSink::new()));

    log.append(SweepPoint {
        frequency_mhz: 915.0,
        power_dbm: 22.5,
        detected: true,
    });
    log.append(SweepPoint {
        frequency_mhz: 920.0,
        power_dbm: 0.0,
        detected: false,
    });

    assert!(log.flush_and_close().unwrap());
    let first = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
        first,
        "frequency_mhz,power_dbm,detected\n915,22.5,true\n920,0,false\n"
    );

    // Late records are dropped and the second flush is a no-op
    log.append(SweepPoint {
        frequency_mhz: 925.0,
        power_dbm: 12.0,
        detected: true,
    });
    assert!(!log.flush_and_close().unwrap());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
}

#[test]
fn dropped_log_is_written() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("retry_attempts.csv");
    {
        let log = ResultLog::<RetrySession>::new(&path, Arc::new(CsvFileSink::new()));
        log.append(RetrySession {
            attempt_index: 0,
            window_duration_ms: 400,
            succeeded: false,
        });
    }

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents, "attempt_index,window_duration_ms,succeeded\n0,400,false\n");
}

#[test]
fn empty_log_writes_header_only() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.csv");
    let log = ResultLog::<SweepPoint>::new(&path, Arc::new(CsvFileSink::new()));
    log.flush_and_close().unwrap();
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "frequency_mhz,power_dbm,detected\n"
    );
}

#[tokio::test(start_paused = true)]
async fn inventory_writes_timestamped_csv() {
    let dir = tempdir().unwrap();
    let reader = Arc::new(SimulatedReader::new(SimulationConfig::default()));
    let ctx = ProcedureContext::new(
        reader,
        Arc::new(CsvFileSink::new()),
        dir.path(),
        ShutdownSignal::new(),
    );

    let params = inventory::InventoryParams {
        target: TargetSpec::Any,
        duration: Duration::from_millis(500),
    };
    let report = inventory::run(&ctx, &params).await.unwrap();

    assert_eq!(report.result.outputs.len(), 1);
    let path = &report.result.outputs[0];
    assert!(path.starts_with(dir.path()));
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("tags_") && name.ends_with(".csv"), "{name}");

    let contents = std::fs::read_to_string(path).unwrap();
    let mut lines = contents.lines();
    assert_eq!(
        lines.next(),
        Some("epc,antenna_id,rssi_dbm,timestamp_ms,channel_mhz")
    );
    assert_eq!(lines.count(), report.observations.len());
}
