//! EM4152 configure-and-read, triggered once on first sight of the target.
//!
//! The sequence writes the SYSTEM CONFIG and SENSOR CONTROL words and reads
//! back the two measurement words. Word pointers are the chip's byte
//! addresses divided by two. The reader runs it once; the dispatcher makes
//! sure it is only ever submitted once however many reports arrive.

use super::{complete, finalize_log, ProcedureContext, ProcedureResult, EVENT_SETTLE};
use crate::config::ProbeConfig;
use crate::error::ProbeResult;
use crate::experiment::{
    DispatchState, ExposureCycle, TagSession, TriggerOnceDispatcher, WindowOutcome,
};
use crate::hardware::{Execution, MemoryBank, OpResult, OperationSequence, TagOperation};
use crate::tag::sensor::{Em4152Reading, SensorStatus, XpcObservation};
use crate::tag::{TagObservation, TargetSpec};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Observation log stem.
pub const TAG_LOG_STEM: &str = "taglog";
/// Operation-result log stem.
pub const OP_RESULT_STEM: &str = "op_results";

/// SYSTEM CONFIG value.
pub const SYSTEM_CONFIG_WORD: u16 = 0x1390;
/// SYSTEM CONFIG byte address.
pub const SYSTEM_CONFIG_ADDRESS: u16 = 0x0120;
/// SENSOR CONTROL value.
pub const SENSOR_CONTROL_WORD: u16 = 0x2000;
/// SENSOR CONTROL byte address.
pub const SENSOR_CONTROL_ADDRESS: u16 = 0x0123;
/// Measurement byte address.
pub const SENSOR_DATA_ADDRESS: u16 = 0x0124;
/// Measurement length in words.
pub const SENSOR_DATA_WORDS: u16 = 2;

/// The write/write/read sequence, run once.
pub fn em4152_sequence() -> OperationSequence {
    OperationSequence::new(None)
        .with_op(TagOperation::write(
            MemoryBank::User,
            SYSTEM_CONFIG_ADDRESS / 2,
            vec![SYSTEM_CONFIG_WORD],
        ))
        .with_op(TagOperation::write(
            MemoryBank::User,
            SENSOR_CONTROL_ADDRESS / 2,
            vec![SENSOR_CONTROL_WORD],
        ))
        .with_op(TagOperation::read(
            MemoryBank::User,
            SENSOR_DATA_ADDRESS / 2,
            SENSOR_DATA_WORDS,
        ))
        .with_execution(Execution::Once)
}

/// Trigger settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerParams {
    /// Tag to wait for.
    pub target: TargetSpec,
    /// How long RF stays on.
    pub duration: Duration,
}

impl TriggerParams {
    /// Target and duration from `[session]`.
    pub fn from_config(config: &ProbeConfig) -> ProbeResult<Self> {
        Ok(Self {
            target: config.session.target()?,
            duration: Duration::from_secs(config.session.duration_secs),
        })
    }
}

/// What a trigger run produced.
#[derive(Debug, Clone)]
pub struct TriggerReport {
    /// Summary, outputs and warnings.
    pub result: ProcedureResult,
    /// Whether the sequence was submitted.
    pub fired: bool,
    /// Every operation result, in arrival order.
    pub op_results: Vec<OpResult>,
    /// Accepted observations.
    pub observations: usize,
    /// Last valid XPC sensor reading, if the reader forwarded one.
    pub sensor: Option<Em4152Reading>,
}

/// Watch for the target and run [`em4152_sequence`] on it once.
pub async fn run(ctx: &ProcedureContext, params: &TriggerParams) -> ProbeResult<TriggerReport> {
    let mut result = ProcedureResult::begin("trigger_ops", ctx.execution_id());
    ctx.connect().await?;

    let tag_log = ctx.log::<XpcObservation>(TAG_LOG_STEM);
    let op_log = ctx.log::<OpResult>(OP_RESULT_STEM);
    let sensor = Arc::new(Mutex::new(None::<Em4152Reading>));

    let decoded = Arc::clone(&sensor);
    let rows = Arc::clone(&tag_log);
    let session = Arc::new(
        TagSession::new(params.target.clone())
            .with_run_id(ctx.execution_id())
            .with_dispatcher(TriggerOnceDispatcher::new(
                Arc::clone(ctx.reader()),
                em4152_sequence(),
            ))
            .with_op_result_log(Arc::clone(&op_log))
            .with_observation_hook(Box::new(move |observation: &TagObservation| {
                let row = XpcObservation::from(observation);
                let sensor = row.sensor;
                rows.append(row);
                let Some(reading) = sensor else {
                    return;
                };
                tracing::info!(
                    epc = %observation.epc,
                    status = ?reading.status,
                    raw = reading.raw,
                    c_sense = reading.c_sense,
                    "EM4152 XPC reading"
                );
                if reading.status == SensorStatus::Valid {
                    *decoded.lock().unwrap_or_else(|p| p.into_inner()) = Some(reading);
                }
            })),
    );
    let pump = Arc::clone(&session).spawn(ctx.reader().subscribe());

    tracing::info!(tag_target = %params.target, "Waiting for target");
    let cycle = ExposureCycle::new(Arc::clone(ctx.reader()), ctx.shutdown().clone(), EVENT_SETTLE);
    let window = cycle.open(params.duration).await;

    let session = pump.finish().await;
    ctx.release().await;

    match window {
        Ok(WindowOutcome::Completed) => {}
        Ok(WindowOutcome::Interrupted) => result.cancelled = true,
        Err(e) => result.warn(format!("Exposure window failed: {e}")),
    }

    let fired = session
        .dispatcher()
        .is_some_and(|d| d.state() == DispatchState::Fired);
    let op_results = op_log.snapshot();
    if !fired {
        result.warn("Target tag was not seen; no operations submitted");
    } else if op_results.is_empty() {
        result.warn("Operation sequence submitted but no results arrived");
    }
    result.success = fired && !op_results.is_empty() && op_results.iter().all(|r| r.success);

    let observations = tag_log.len();
    finalize_log(&tag_log, &mut result);
    finalize_log(&op_log, &mut result);

    let sensor = *sensor.lock().unwrap_or_else(|p| p.into_inner());
    Ok(TriggerReport {
        result: complete(result),
        fired,
        op_results,
        observations,
        sensor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::OpKind;

    #[test]
    fn sequence_layout() {
        let sequence = em4152_sequence();
        assert_eq!(sequence.execution, Execution::Once);
        assert!(sequence.target.is_none());
        let kinds: Vec<OpKind> = sequence.ops.iter().map(TagOperation::kind).collect();
        assert_eq!(kinds, vec![OpKind::Write, OpKind::Write, OpKind::Read]);

        match &sequence.ops[0] {
            TagOperation::Write {
                word_pointer, data, ..
            } => {
                assert_eq!(*word_pointer, 0x90);
                assert_eq!(data, &vec![0x1390]);
            }
            other => panic!("unexpected op {other:?}"),
        }
        match &sequence.ops[2] {
            TagOperation::Read {
                word_pointer,
                word_count,
                ..
            } => {
                assert_eq!(*word_pointer, 0x92);
                assert_eq!(*word_count, 2);
            }
            other => panic!("unexpected op {other:?}"),
        }
    }
}
