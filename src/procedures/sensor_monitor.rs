//! Magnus-S3 sensor-code monitor.
//!
//! Registers a persistent one-word read of reserved word `0xC` and logs every
//! successful result from the target until the timeout elapses or shutdown is
//! requested. A rejected registration ends the run as incomplete with an empty
//! log.

use super::{complete, finalize_log, ProcedureContext, ProcedureResult, EVENT_SETTLE};
use crate::config::ProbeConfig;
use crate::error::{ProbeError, ProbeResult};
use crate::experiment::{ExposureCycle, TagSession, WindowOutcome};
use crate::hardware::{Execution, MemoryBank, OpResult, OperationSequence, TagOperation};
use crate::tag::sensor::{sensor_code, SensorCodeReading};
use crate::tag::timestamp::now_ms;
use crate::tag::{Epc, TargetSpec};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Output file stem.
pub const OUTPUT_STEM: &str = "sensor_codes";
/// Reserved-bank word holding the sensor code.
pub const SENSOR_CODE_WORD: u16 = 0xC;

/// Monitor settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorParams {
    /// Magnus-S3 tag.
    pub target: Epc,
    /// Total monitoring time.
    pub timeout: Duration,
}

impl MonitorParams {
    /// Target and timeout from `[session]`.
    pub fn from_config(config: &ProbeConfig) -> ProbeResult<Self> {
        Ok(Self {
            target: Epc::parse(&config.session.monitor_epc)?,
            timeout: Duration::from_secs(config.session.monitor_timeout_secs),
        })
    }
}

/// What a monitor run produced.
#[derive(Debug, Clone)]
pub struct MonitorReport {
    /// Summary, outputs and warnings.
    pub result: ProcedureResult,
    /// Every logged sample, in arrival order.
    pub readings: Vec<SensorCodeReading>,
}

/// Log sensor codes from `params.target` until the timeout.
pub async fn run(ctx: &ProcedureContext, params: &MonitorParams) -> ProbeResult<MonitorReport> {
    let mut result = ProcedureResult::begin("sensor_monitor", ctx.execution_id());
    ctx.connect().await?;

    let read = TagOperation::read(MemoryBank::Reserved, SENSOR_CODE_WORD, 1);
    let read_id = read.id();
    let sequence = OperationSequence::new(Some(params.target.clone()))
        .with_op(read)
        .with_execution(Execution::EverySingulation);

    let log = ctx.log::<SensorCodeReading>(OUTPUT_STEM);

    // RF is still off, so no results can arrive before the pump is running
    if let Err(e) = ctx.reader().submit_operation_sequence(sequence).await {
        ctx.release().await;
        result.warn(ProbeError::device(format!("failed to register sensor read: {e}")).to_string());
        finalize_log(&log, &mut result);
        return Ok(MonitorReport {
            result: complete(result),
            readings: Vec::new(),
        });
    }

    let samples = Arc::clone(&log);
    let count = AtomicU64::new(0);
    let target = params.target.clone();

    let session = Arc::new(
        TagSession::new(TargetSpec::Exact(params.target.clone()))
            .with_run_id(ctx.execution_id())
            .with_op_result_hook(Box::new(move |op: &OpResult| {
                if op.op_id != read_id || op.epc != target {
                    return;
                }
                let Some(code) = op.read_data().and_then(sensor_code) else {
                    return;
                };
                let reading = SensorCodeReading {
                    count: count.fetch_add(1, Ordering::SeqCst) + 1,
                    epc: op.epc.clone(),
                    frequency_mhz: op.channel_mhz,
                    sensor_code: code,
                    timestamp_ms: now_ms(),
                };
                tracing::info!(
                    count = reading.count,
                    epc = %reading.epc,
                    sensor_code = reading.sensor_code,
                    "Sensor code"
                );
                samples.append(reading);
            })),
    );
    let pump = Arc::clone(&session).spawn(ctx.reader().subscribe());

    tracing::info!(
        epc = %params.target,
        timeout_s = params.timeout.as_secs_f64(),
        "Monitoring sensor codes"
    );
    let cycle = ExposureCycle::new(Arc::clone(ctx.reader()), ctx.shutdown().clone(), EVENT_SETTLE);
    match cycle.open(params.timeout).await {
        Ok(WindowOutcome::Completed) => {}
        Ok(WindowOutcome::Interrupted) => result.cancelled = true,
        Err(e) => result.warn(format!("Exposure window failed: {e}")),
    }

    pump.finish().await;
    ctx.release().await;

    let readings = log.snapshot();
    result.success = !readings.is_empty();
    if readings.is_empty() && !result.cancelled {
        result.warn(format!("No sensor codes received from {}", params.target));
    }
    finalize_log(&log, &mut result);

    Ok(MonitorReport {
        result: complete(result),
        readings,
    })
}
