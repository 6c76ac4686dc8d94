//! Integration tests for the turn-on power sweep.

use rfid_probe::data::MemorySink;
use rfid_probe::experiment::{PowerRange, ShutdownSignal, SweepPoint, SweepPolicy};
use rfid_probe::hardware::{ChannelThreshold, SimulatedReader, SimulatedTag, SimulationConfig};
use rfid_probe::procedures::{turn_on, ProcedureContext};
use rfid_probe::tag::Epc;
use std::sync::Arc;
use std::time::Duration;

const SWEEP_EPC: &str = "000000A93C0000000003000E00000DAD";

/// Tag that turns on at 22.5 dBm on 915 MHz and never answers on 920 MHz.
fn sweep_reader(extra_tags: Vec<SimulatedTag>) -> Arc<SimulatedReader> {
    let mut tag = SimulatedTag::with_epc(SWEEP_EPC);
    tag.thresholds = vec![
        ChannelThreshold {
            frequency_mhz: 915.0,
            turn_on_dbm: Some(22.5),
        },
        ChannelThreshold {
            frequency_mhz: 920.0,
            turn_on_dbm: None,
        },
    ];
    let mut tags = vec![tag];
    tags.extend(extra_tags);
    Arc::new(SimulatedReader::new(SimulationConfig {
        tags,
        ..Default::default()
    }))
}

fn params(policy: SweepPolicy) -> turn_on::TurnOnParams {
    turn_on::TurnOnParams {
        target: Epc::parse(SWEEP_EPC).unwrap(),
        frequencies_mhz: vec![915.0, 920.0],
        power: PowerRange::new(10.0, 30.0, 0.5).unwrap(),
        trial_window: Duration::from_millis(400),
        settle: Duration::from_millis(50),
        policy,
    }
}

#[tokio::test(start_paused = true)]
async fn finds_turn_on_power_per_frequency() {
    let reader = sweep_reader(Vec::new());
    let sink = Arc::new(MemorySink::new());
    let ctx = ProcedureContext::new(reader.clone(), sink.clone(), "data", ShutdownSignal::new());

    let report = turn_on::run(&ctx, &params(SweepPolicy::EarlyExit)).await.unwrap();

    assert_eq!(
        report.points,
        vec![
            SweepPoint {
                frequency_mhz: 915.0,
                power_dbm: 22.5,
                detected: true,
            },
            SweepPoint {
                frequency_mhz: 920.0,
                power_dbm: 0.0,
                detected: false,
            },
        ]
    );
    assert!(report.result.success);

    // 26 trials up to 22.5 dBm, then all 41 powers on 920 MHz
    assert_eq!(reader.windows_opened(), 26 + 41);
    let history = reader.configure_history();
    assert_eq!(history.len(), 26 + 41);
    assert_eq!(history[0].power_dbm, 10.0);
    assert_eq!(history[25].power_dbm, 22.5);
    assert_eq!(history[26].frequency_mhz, 920.0);
    assert_eq!(history.last().unwrap().power_dbm, 30.0);

    let files = sink.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].header, vec!["frequency_mhz", "power_dbm", "detected"]);
    assert_eq!(
        files[0].rows,
        vec![vec!["915", "22.5", "true"], vec!["920", "0", "false"]]
    );
}

#[tokio::test(start_paused = true)]
async fn other_tags_do_not_count_as_detection() {
    // A tag that answers everywhere at 10 dBm must not end the search early
    let mut neighbour = SimulatedTag::with_epc("E2801160600002054E7FA4D6");
    neighbour.turn_on_dbm = Some(10.0);
    let reader = sweep_reader(vec![neighbour]);
    let sink = Arc::new(MemorySink::new());
    let ctx = ProcedureContext::new(reader.clone(), sink, "data", ShutdownSignal::new());

    let report = turn_on::run(&ctx, &params(SweepPolicy::EarlyExit)).await.unwrap();

    assert_eq!(report.points[0].power_dbm, 22.5);
    assert!(!report.points[1].detected);
}

#[tokio::test(start_paused = true)]
async fn full_range_scans_every_power() {
    let reader = sweep_reader(Vec::new());
    let sink = Arc::new(MemorySink::new());
    let ctx = ProcedureContext::new(reader.clone(), sink, "data", ShutdownSignal::new());

    let report = turn_on::run(&ctx, &params(SweepPolicy::FullRange)).await.unwrap();

    assert_eq!(report.points[0].power_dbm, 22.5);
    assert!(report.points[0].detected);
    assert_eq!(reader.windows_opened(), 41 + 41);
}

#[tokio::test(start_paused = true)]
async fn reader_frequencies_are_used_when_none_are_given() {
    let reader = sweep_reader(Vec::new());
    let sink = Arc::new(MemorySink::new());
    let ctx = ProcedureContext::new(reader.clone(), sink, "data", ShutdownSignal::new());

    let mut params = params(SweepPolicy::EarlyExit);
    params.frequencies_mhz.clear();
    let report = turn_on::run(&ctx, &params).await.unwrap();

    let frequencies: Vec<f64> = report.points.iter().map(|p| p.frequency_mhz).collect();
    assert_eq!(frequencies, SimulationConfig::default().tx_frequencies);
    // Default turn-on power applies on channels without an override
    assert!(report.points.iter().all(|p| p.detected && p.power_dbm == 15.0));
}
