//! Single-window inventory.
//!
//! Opens one exposure window and logs every observation that passes the
//! target filter. An exact EPC, an EPC prefix (for example a chip vendor's
//! `E280B120`) or match-all can be used.

use super::{complete, finalize_log, ProcedureContext, ProcedureResult, EVENT_SETTLE};
use crate::config::ProbeConfig;
use crate::error::ProbeResult;
use crate::experiment::{ExposureCycle, TagSession, WindowOutcome};
use crate::tag::{Epc, TagObservation, TargetSpec};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Output file stem.
pub const OUTPUT_STEM: &str = "tags";

/// Inventory settings.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryParams {
    /// Exact, prefix or match-all.
    pub target: TargetSpec,
    /// Window length.
    pub duration: Duration,
}

impl InventoryParams {
    /// Target and duration from `[session]`.
    pub fn from_config(config: &ProbeConfig) -> ProbeResult<Self> {
        Ok(Self {
            target: config.session.target()?,
            duration: Duration::from_secs(config.session.duration_secs),
        })
    }
}

/// What an inventory run saw.
#[derive(Debug, Clone)]
pub struct InventoryReport {
    /// Summary, outputs and warnings.
    pub result: ProcedureResult,
    /// Accepted observations, in arrival order.
    pub observations: Vec<TagObservation>,
    /// Distinct EPCs seen.
    pub distinct: BTreeSet<Epc>,
}

/// Run one inventory window.
pub async fn run(ctx: &ProcedureContext, params: &InventoryParams) -> ProbeResult<InventoryReport> {
    let mut result = ProcedureResult::begin("inventory", ctx.execution_id());
    ctx.connect().await?;

    tracing::info!(
        tag_target = %params.target,
        duration_s = params.duration.as_secs_f64(),
        "Starting inventory"
    );
    let log = ctx.log::<TagObservation>(OUTPUT_STEM);
    let session = Arc::new(
        TagSession::new(params.target.clone())
            .with_run_id(ctx.execution_id())
            .with_observation_log(Arc::clone(&log)),
    );
    let pump = Arc::clone(&session).spawn(ctx.reader().subscribe());

    let cycle = ExposureCycle::new(Arc::clone(ctx.reader()), ctx.shutdown().clone(), EVENT_SETTLE);
    match cycle.open(params.duration).await {
        Ok(WindowOutcome::Completed) => result.success = true,
        Ok(WindowOutcome::Interrupted) => result.cancelled = true,
        Err(e) => result.warn(format!("Inventory window failed: {e}")),
    }

    pump.finish().await;
    ctx.release().await;

    let observations = log.snapshot();
    let distinct: BTreeSet<Epc> = observations.iter().map(|o| o.epc.clone()).collect();
    tracing::info!(
        observations = observations.len(),
        distinct = distinct.len(),
        "Inventory finished"
    );
    finalize_log(&log, &mut result);

    Ok(InventoryReport {
        result: complete(result),
        observations,
        distinct,
    })
}
