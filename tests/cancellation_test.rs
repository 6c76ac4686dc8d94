//! Shutdown during long-running procedures.

use rfid_probe::data::MemorySink;
use rfid_probe::experiment::{PowerRange, ShutdownSignal, SweepPolicy};
use rfid_probe::hardware::{SimulatedReader, SimulatedTag, SimulationConfig};
use rfid_probe::procedures::{inventory, turn_on, ProcedureContext};
use rfid_probe::tag::{Epc, TargetSpec};
use std::sync::Arc;
use std::time::Duration;

const EPC: &str = "E2801160600002054E7FA4D6";

fn reader_with_turn_on(dbm: f64) -> Arc<SimulatedReader> {
    let mut tag = SimulatedTag::with_epc(EPC);
    tag.turn_on_dbm = Some(dbm);
    Arc::new(SimulatedReader::new(SimulationConfig {
        tags: vec![tag],
        ..Default::default()
    }))
}

fn trigger_after(shutdown: &ShutdownSignal, after: Duration) {
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        shutdown.trigger("operator interrupt");
    });
}

#[tokio::test(start_paused = true)]
async fn interrupted_sweep_keeps_completed_frequencies() {
    let reader = reader_with_turn_on(12.0);
    let sink = Arc::new(MemorySink::new());
    let shutdown = ShutdownSignal::new();
    let ctx = ProcedureContext::new(reader.clone(), sink.clone(), "data", shutdown.clone());

    let params = turn_on::TurnOnParams {
        target: Epc::parse(EPC).unwrap(),
        frequencies_mhz: vec![902.75, 915.25, 927.25],
        power: PowerRange::new(10.0, 30.0, 0.5).unwrap(),
        trial_window: Duration::from_millis(400),
        settle: Duration::from_millis(50),
        policy: SweepPolicy::EarlyExit,
    };

    // Five 450 ms trials per frequency: the third frequency starts at 4.5 s
    trigger_after(&shutdown, Duration::from_millis(5000));
    let report = turn_on::run(&ctx, &params).await.unwrap();

    assert!(report.result.cancelled);
    assert!(!report.result.success);
    let frequencies: Vec<f64> = report.points.iter().map(|p| p.frequency_mhz).collect();
    assert_eq!(frequencies, vec![902.75, 915.25]);
    assert!(report.points.iter().all(|p| p.detected && p.power_dbm == 12.0));

    let files = sink.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].rows.len(), 2);
    assert!(!reader.is_exposing());
    assert!(!reader.is_connected());
    assert!(report.result.summary().contains(" CANCELLED "));
}

#[tokio::test(start_paused = true)]
async fn shutdown_before_start_opens_no_window() {
    let reader = reader_with_turn_on(12.0);
    let sink = Arc::new(MemorySink::new());
    let shutdown = ShutdownSignal::new();
    shutdown.trigger("already stopping");
    let ctx = ProcedureContext::new(reader.clone(), sink.clone(), "data", shutdown);

    let params = inventory::InventoryParams {
        target: TargetSpec::Any,
        duration: Duration::from_secs(10),
    };
    let report = inventory::run(&ctx, &params).await.unwrap();

    assert!(report.result.cancelled);
    assert!(report.observations.is_empty());
    assert_eq!(reader.windows_opened(), 0);
    // The log is still finalized, header only
    assert_eq!(sink.files().len(), 1);
    assert!(sink.files()[0].rows.is_empty());
}

#[tokio::test(start_paused = true)]
async fn interrupted_inventory_keeps_what_was_seen() {
    let reader = reader_with_turn_on(12.0);
    let sink = Arc::new(MemorySink::new());
    let shutdown = ShutdownSignal::new();
    let ctx = ProcedureContext::new(reader.clone(), sink.clone(), "data", shutdown.clone());

    trigger_after(&shutdown, Duration::from_millis(300));
    let params = inventory::InventoryParams {
        target: TargetSpec::Any,
        duration: Duration::from_secs(10),
    };
    let started = tokio::time::Instant::now();
    let report = inventory::run(&ctx, &params).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(report.result.cancelled);
    assert!(!report.observations.is_empty());
    assert_eq!(sink.files()[0].rows.len(), report.observations.len());
}
