//! Turn-on power characterization.
//!
//! For each transmit frequency the power is stepped up until the target EPC
//! answers inside a trial window. Detection is read from the session latch,
//! which is cleared before every trial.

use super::{complete, finalize_log, ProcedureContext, ProcedureResult};
use crate::config::ProbeConfig;
use crate::error::{ProbeError, ProbeResult};
use crate::experiment::{
    DetectionCheck, ExposureCycle, PowerRange, SweepPoint, SweepPolicy, TagSession, ThresholdSweep,
};
use crate::tag::{Epc, TargetSpec};
use std::sync::Arc;
use std::time::Duration;

/// Output file stem.
pub const OUTPUT_STEM: &str = "turn_on_power";

/// Sweep settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOnParams {
    /// Tag whose turn-on power is measured.
    pub target: Epc,
    /// Empty means every frequency the reader supports.
    pub frequencies_mhz: Vec<f64>,
    /// Powers tried per frequency.
    pub power: PowerRange,
    /// RF-on time per trial.
    pub trial_window: Duration,
    /// Pause after each trial before detection is read.
    pub settle: Duration,
    /// Whether a frequency stops at the first detection.
    pub policy: SweepPolicy,
}

impl TurnOnParams {
    /// Settings from `[sweep]`.
    pub fn from_config(config: &ProbeConfig) -> ProbeResult<Self> {
        let sweep = &config.sweep;
        Ok(Self {
            target: Epc::parse(&sweep.target_epc)?,
            frequencies_mhz: sweep.frequencies_mhz.clone(),
            power: sweep.power_range()?,
            trial_window: sweep.trial_window(),
            settle: Duration::from_millis(sweep.settle_ms),
            policy: sweep.policy,
        })
    }
}

/// What a sweep run produced.
#[derive(Debug, Clone)]
pub struct TurnOnReport {
    /// Summary, outputs and warnings.
    pub result: ProcedureResult,
    /// One point per completed frequency, in sweep order.
    pub points: Vec<SweepPoint>,
}

/// Detection from the session latch.
struct LatchCheck {
    session: Arc<TagSession>,
}

impl DetectionCheck for LatchCheck {
    fn reset(&mut self) {
        self.session.latch().reset();
    }

    fn detected(&mut self, _frequency_mhz: f64, _power_dbm: f64) -> bool {
        self.session.latch().is_set()
    }
}

/// Find the turn-on power of `params.target` on every frequency.
pub async fn run(ctx: &ProcedureContext, params: &TurnOnParams) -> ProbeResult<TurnOnReport> {
    let mut result = ProcedureResult::begin("turn_on", ctx.execution_id());
    ctx.connect().await?;

    let frequencies = if params.frequencies_mhz.is_empty() {
        match ctx.reader().tx_frequencies().await {
            Ok(frequencies) => frequencies,
            Err(e) => {
                ctx.release().await;
                return Err(ProbeError::connection(format!(
                    "failed to query transmit frequencies: {e}"
                )));
            }
        }
    } else {
        params.frequencies_mhz.clone()
    };

    tracing::info!(
        epc = %params.target,
        frequencies = frequencies.len(),
        min_dbm = params.power.min_dbm,
        max_dbm = params.power.max_dbm,
        step_dbm = params.power.step_dbm,
        "Starting turn-on sweep"
    );

    let session = Arc::new(
        TagSession::new(TargetSpec::Exact(params.target.clone())).with_run_id(ctx.execution_id()),
    );
    let pump = Arc::clone(&session).spawn(ctx.reader().subscribe());

    let log = ctx.log::<SweepPoint>(OUTPUT_STEM);
    let cycle = ExposureCycle::new(Arc::clone(ctx.reader()), ctx.shutdown().clone(), params.settle);
    let sweep = ThresholdSweep::new(cycle, params.power, params.trial_window)
        .with_policy(params.policy)
        .with_log(Arc::clone(&log));

    let mut check = LatchCheck {
        session: Arc::clone(&session),
    };
    let outcome = sweep.sweep(&frequencies, &mut check).await;
    drop(check);

    pump.finish().await;
    ctx.release().await;

    result.cancelled = outcome.cancelled;
    result.success = !outcome.cancelled && outcome.points.iter().any(|p| p.detected);
    if !outcome.cancelled && !result.success {
        result.warn(format!("{} was not detected on any frequency", params.target));
    }
    finalize_log(&log, &mut result);

    Ok(TurnOnReport {
        result: complete(result),
        points: outcome.points,
    })
}
