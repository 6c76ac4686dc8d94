//! End-to-end procedure runs against the simulated reader.

use rfid_probe::config::ProbeConfig;
use rfid_probe::data::MemorySink;
use rfid_probe::experiment::ShutdownSignal;
use rfid_probe::hardware::{open_reader, SimulatedReader, SimulatedTag, SimulationConfig};
use rfid_probe::procedures::{inventory, sensor_monitor, turn_on, ProcedureContext};
use rfid_probe::tag::{Epc, TargetSpec};
use rfid_probe::ProbeError;
use std::sync::Arc;
use std::time::Duration;

const MAGNUS_EPC: &str = "E282403D000203DB0478B057";

fn reader_with(tags: Vec<SimulatedTag>) -> Arc<SimulatedReader> {
    Arc::new(SimulatedReader::new(SimulationConfig {
        tags,
        ..Default::default()
    }))
}

#[tokio::test(start_paused = true)]
async fn inventory_prefix_filter() {
    let reader = reader_with(vec![
        SimulatedTag::with_epc("E280B1200000000000000001"),
        SimulatedTag::with_epc("e280 b120 0000 0000 0000 0002"),
        SimulatedTag::with_epc("300833B2DDD9014000000000"),
    ]);
    let sink = Arc::new(MemorySink::new());
    let ctx = ProcedureContext::new(reader, sink.clone(), "data", ShutdownSignal::new());

    let params = inventory::InventoryParams {
        target: TargetSpec::prefix("e280b120").unwrap(),
        duration: Duration::from_secs(1),
    };
    let report = inventory::run(&ctx, &params).await.unwrap();

    assert!(report.result.success);
    let distinct: Vec<String> = report.distinct.iter().map(ToString::to_string).collect();
    assert_eq!(
        distinct,
        vec!["E280B1200000000000000001", "E280B1200000000000000002"]
    );
    assert!(report
        .observations
        .iter()
        .all(|o| o.epc.as_str().starts_with("E280B120")));

    let files = sink.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].rows.len(), report.observations.len());
}

#[tokio::test(start_paused = true)]
async fn refused_connection_writes_nothing() {
    let reader = Arc::new(SimulatedReader::new(SimulationConfig {
        refuse_connection: true,
        ..Default::default()
    }));
    let sink = Arc::new(MemorySink::new());
    let ctx = ProcedureContext::new(reader.clone(), sink.clone(), "data", ShutdownSignal::new());

    let err = inventory::run(
        &ctx,
        &inventory::InventoryParams {
            target: TargetSpec::Any,
            duration: Duration::from_secs(1),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ProbeError::Connection(_)));

    let err = turn_on::run(
        &ctx,
        &turn_on::TurnOnParams::from_config(&ProbeConfig::default()).unwrap(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ProbeError::Connection(_)));

    assert!(sink.files().is_empty());
    assert_eq!(reader.windows_opened(), 0);
}

#[test]
fn network_address_is_rejected() {
    let err = open_reader("169.254.116.164", &SimulationConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, ProbeError::Connection(_)));
}

#[tokio::test(start_paused = true)]
async fn sensor_monitor_logs_codes() {
    let reader = reader_with(vec![
        SimulatedTag::with_epc(MAGNUS_EPC),
        SimulatedTag::with_epc("E2801160600002054E7FA4D6"),
    ]);
    let sink = Arc::new(MemorySink::new());
    let ctx = ProcedureContext::new(reader.clone(), sink.clone(), "data", ShutdownSignal::new());

    let params = sensor_monitor::MonitorParams {
        target: Epc::parse(MAGNUS_EPC).unwrap(),
        timeout: Duration::from_secs(1),
    };
    let report = sensor_monitor::run(&ctx, &params).await.unwrap();

    assert!(report.result.success);
    assert!(!report.readings.is_empty());
    assert!(report.readings.iter().all(|r| r.sensor_code == 300));
    assert!(report.readings.iter().all(|r| r.epc.as_str() == MAGNUS_EPC));
    let counts: Vec<u64> = report.readings.iter().map(|r| r.count).collect();
    let expected: Vec<u64> = (1..=counts.len() as u64).collect();
    assert_eq!(counts, expected);
    assert_eq!(reader.submitted_sequences(), 1);

    let files = sink.files();
    assert_eq!(files.len(), 1);
    assert_eq!(
        files[0].header,
        vec!["count", "epc", "frequency_mhz", "sensor_code", "timestamp_ms"]
    );
    assert_eq!(files[0].rows[0][0], "1");
    assert_eq!(files[0].rows[0][3], "300");
}

#[tokio::test(start_paused = true)]
async fn sensor_monitor_without_target_is_incomplete() {
    let reader = reader_with(vec![SimulatedTag::with_epc("E2801160600002054E7FA4D6")]);
    let sink = Arc::new(MemorySink::new());
    let ctx = ProcedureContext::new(reader, sink.clone(), "data", ShutdownSignal::new());

    let params = sensor_monitor::MonitorParams {
        target: Epc::parse(MAGNUS_EPC).unwrap(),
        timeout: Duration::from_millis(500),
    };
    let report = sensor_monitor::run(&ctx, &params).await.unwrap();

    assert!(!report.result.success);
    assert!(report.readings.is_empty());
    assert_eq!(report.result.warnings.len(), 1);
    assert!(sink.files()[0].rows.is_empty());
}

#[tokio::test(start_paused = true)]
async fn sensor_monitor_rejected_registration_is_incomplete() {
    let reader = Arc::new(SimulatedReader::new(SimulationConfig {
        tags: vec![SimulatedTag::with_epc(MAGNUS_EPC)],
        failing_submissions: vec![1],
        ..Default::default()
    }));
    let sink = Arc::new(MemorySink::new());
    let ctx = ProcedureContext::new(reader.clone(), sink.clone(), "data", ShutdownSignal::new());

    let params = sensor_monitor::MonitorParams {
        target: Epc::parse(MAGNUS_EPC).unwrap(),
        timeout: Duration::from_secs(1),
    };
    let report = sensor_monitor::run(&ctx, &params).await.unwrap();

    assert!(!report.result.success);
    assert!(!report.result.cancelled);
    assert!(report.readings.is_empty());
    assert_eq!(report.result.warnings.len(), 1);
    assert!(report.result.warnings[0].contains("failed to register sensor read"));
    assert_eq!(reader.windows_opened(), 0);
    assert!(!reader.is_connected());
    assert!(sink.files()[0].rows.is_empty());
}

#[test]
fn sample_config_loads() {
    let config = ProbeConfig::load_from("config/probe.toml").unwrap();
    config.validate().unwrap();
    assert_eq!(config.simulation.tags.len(), 3);
    assert_eq!(
        config.simulation.tags[1].turn_on_at(915.25),
        Some(22.5),
        "per-channel override"
    );
    assert_eq!(config.simulation.tags[1].turn_on_at(927.25), None);
    assert!(config.simulation.tags[2].humidity.is_some());
}
