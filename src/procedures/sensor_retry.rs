//! Humidity read with escalating exposure.
//!
//! A passive humidity tag only completes a measurement after harvesting enough
//! energy; until then its USER memory does not start with the `0xAA` header. A
//! persistent 8-word read is registered, then exposure windows of growing
//! length are opened until the latest successful read carries the header. A
//! rejected registration fails that attempt and is resubmitted on the next.

use super::{complete, finalize_log, ProcedureContext, ProcedureResult};
use crate::config::ProbeConfig;
use crate::error::{ProbeError, ProbeResult};
use crate::experiment::{
    ExposureCycle, RetryEscalationController, RetryOutcome, RetryPolicy, RetrySession, TagSession,
};
use crate::hardware::{Execution, MemoryBank, OperationSequence, TagOperation};
use crate::tag::sensor::{header_ready, HumidityReading};
use crate::tag::TargetSpec;
use std::sync::Arc;
use std::time::Duration;

/// Output file stem.
pub const OUTPUT_STEM: &str = "retry_attempts";
/// First USER word of the humidity record.
pub const HUMIDITY_WORD_POINTER: u16 = 0x10;
/// Words read per singulation.
pub const HUMIDITY_WORD_COUNT: u16 = 8;

/// Retry settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRetryParams {
    /// Humidity tag; an exact EPC restricts the read to that tag.
    pub target: TargetSpec,
    /// Attempt budget, window growth and pre-warm.
    pub policy: RetryPolicy,
}

impl SensorRetryParams {
    /// Target from `[session]`, policy from `[retry]`.
    pub fn from_config(config: &ProbeConfig) -> ProbeResult<Self> {
        Ok(Self {
            target: config.session.target()?,
            policy: config.retry,
        })
    }
}

/// What a retry run produced.
#[derive(Debug, Clone)]
pub struct SensorRetryReport {
    /// Summary, outputs and warnings.
    pub result: ProcedureResult,
    /// Every attempt made.
    pub outcome: RetryOutcome,
    /// Decoded reading from the successful attempt.
    pub humidity: Option<HumidityReading>,
}

/// Read the humidity record, escalating exposure until it is ready.
pub async fn run(
    ctx: &ProcedureContext,
    params: &SensorRetryParams,
) -> ProbeResult<SensorRetryReport> {
    let mut result = ProcedureResult::begin("sensor_retry", ctx.execution_id());
    ctx.connect().await?;

    let read = TagOperation::read(MemoryBank::User, HUMIDITY_WORD_POINTER, HUMIDITY_WORD_COUNT);
    let read_id = read.id();
    let sequence = OperationSequence::new(params.target.exact_epc().cloned())
        .with_op(read)
        .with_execution(Execution::EverySingulation);

    let session = Arc::new(TagSession::new(params.target.clone()).with_run_id(ctx.execution_id()));
    let pump = Arc::clone(&session).spawn(ctx.reader().subscribe());

    let log = ctx.log::<RetrySession>(OUTPUT_STEM);
    let cycle = ExposureCycle::new(
        Arc::clone(ctx.reader()),
        ctx.shutdown().clone(),
        Duration::from_millis(params.policy.settle_ms),
    );
    let controller =
        RetryEscalationController::new(cycle, params.policy).with_log(Arc::clone(&log));

    let board = Arc::clone(&session);
    let outcome = controller
        .run_with_setup(
            || {
                let reader = Arc::clone(ctx.reader());
                let sequence = sequence.clone();
                async move {
                    reader
                        .submit_operation_sequence(sequence)
                        .await
                        .map_err(|e| {
                            ProbeError::device(format!("failed to register humidity read: {e}"))
                        })
                }
            },
            || {
                board
                    .board()
                    .latest_success_for(read_id)
                    .and_then(|r| r.read_data().map(header_ready))
                    .unwrap_or(false)
            },
        )
        .await;

    let session = pump.finish().await;
    ctx.release().await;

    let humidity = if outcome.succeeded {
        session
            .board()
            .latest_success_for(read_id)
            .and_then(|r| r.read_data().and_then(HumidityReading::from_payload))
    } else {
        None
    };
    match humidity {
        Some(reading) => tracing::info!(
            humidity_percent = reading.humidity_percent,
            attempts = outcome.sessions.len(),
            "Humidity reading"
        ),
        None if outcome.cancelled => {}
        None => result.warn(format!(
            "No humidity reading after {} attempt(s)",
            outcome.sessions.len()
        )),
    }

    result.success = outcome.succeeded;
    result.cancelled = outcome.cancelled;
    finalize_log(&log, &mut result);

    Ok(SensorRetryReport {
        result: complete(result),
        outcome,
        humidity,
    })
}
