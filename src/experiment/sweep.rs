//! Turn-on threshold search over frequency and power.
//!
//! For every frequency, in order, power is stepped upward from `min_dbm` to
//! `max_dbm` and one trial window is opened per step. Under
//! [`SweepPolicy::EarlyExit`] the first detecting power is recorded and the scan
//! moves to the next frequency; this relies on detection being monotonic in
//! power. [`SweepPolicy::FullRange`] scans every power instead, records the
//! lowest detecting one and warns when a detection is followed by a miss.
//! Frequencies with no detection are recorded at 0 dBm, `detected = false`.

use super::exposure::{ExposureCycle, WindowOutcome};
use crate::data::ResultLog;
use crate::error::{ProbeError, ProbeResult};
use crate::hardware::RfSettings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Float slack when counting power steps.
const STEP_EPSILON: f64 = 1e-9;

/// Most trial powers one frequency may scan.
pub const MAX_POWER_STEPS: usize = 10_000;

/// Inclusive power range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerRange {
    /// First power tried.
    pub min_dbm: f64,
    /// Upper bound, inclusive.
    pub max_dbm: f64,
    /// Increment, strictly positive.
    pub step_dbm: f64,
}

impl PowerRange {
    /// Validated range.
    pub fn new(min_dbm: f64, max_dbm: f64, step_dbm: f64) -> ProbeResult<Self> {
        let range = Self {
            min_dbm,
            max_dbm,
            step_dbm,
        };
        range.validate()?;
        Ok(range)
    }

    /// Rejects a non-positive step, an inverted range and ranges with more
    /// than [`MAX_POWER_STEPS`] trial powers.
    pub fn validate(&self) -> ProbeResult<()> {
        self.step_count().map(|_| ())
    }

    /// Number of step increments after `min_dbm`.
    fn step_count(&self) -> ProbeResult<usize> {
        if !(self.step_dbm.is_finite() && self.step_dbm > 0.0) {
            return Err(ProbeError::Configuration(format!(
                "power step must be positive, got {}",
                self.step_dbm
            )));
        }
        if !(self.min_dbm.is_finite() && self.max_dbm.is_finite()) || self.min_dbm > self.max_dbm
        {
            return Err(ProbeError::Configuration(format!(
                "invalid power range {}..={} dBm",
                self.min_dbm, self.max_dbm
            )));
        }
        let steps = ((self.max_dbm - self.min_dbm) / self.step_dbm + STEP_EPSILON).floor();
        if !steps.is_finite() || steps >= MAX_POWER_STEPS as f64 {
            return Err(ProbeError::Configuration(format!(
                "power step {} dBm gives more than {MAX_POWER_STEPS} trials over {}..={} dBm",
                self.step_dbm, self.min_dbm, self.max_dbm
            )));
        }
        Ok(steps as usize)
    }

    /// Ascending power values, `min_dbm` and (when on a step) `max_dbm` included.
    ///
    /// Values are computed from the step index rather than accumulated, so
    /// 10 + 25 * 0.5 is exactly 22.5.
    pub fn values(&self) -> Vec<f64> {
        let Ok(steps) = self.step_count() else {
            return Vec::new();
        };
        (0..=steps)
            .map(|i| self.min_dbm + i as f64 * self.step_dbm)
            .collect()
    }
}

/// How the power loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepPolicy {
    /// Stop at the first detecting power.
    #[default]
    EarlyExit,
    /// Scan every power.
    FullRange,
}

/// Threshold for one frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    /// Carrier frequency.
    pub frequency_mhz: f64,
    /// Lowest detecting power, `0.0` when not detected.
    pub power_dbm: f64,
    /// Whether any power in the range woke the target.
    pub detected: bool,
}

/// Whether the target answered during the last trial window.
pub trait DetectionCheck: Send {
    /// Called before each trial window opens.
    fn reset(&mut self) {}

    /// Called after the trial window at (`frequency_mhz`, `power_dbm`) closed.
    fn detected(&mut self, frequency_mhz: f64, power_dbm: f64) -> bool;
}

impl<F> DetectionCheck for F
where
    F: FnMut(f64, f64) -> bool + Send,
{
    fn detected(&mut self, frequency_mhz: f64, power_dbm: f64) -> bool {
        self(frequency_mhz, power_dbm)
    }
}

/// Result of a sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepOutcome {
    /// One point per fully scanned frequency, in input order.
    pub points: Vec<SweepPoint>,
    /// Whether shutdown stopped the sweep.
    pub cancelled: bool,
}

enum Trial {
    Detected(bool),
    Interrupted,
}

/// Runs the nested frequency/power search.
pub struct ThresholdSweep {
    cycle: ExposureCycle,
    power: PowerRange,
    trial_window: Duration,
    policy: SweepPolicy,
    log: Option<Arc<ResultLog<SweepPoint>>>,
}

impl ThresholdSweep {
    /// Sweep with the default [`SweepPolicy`] and no result log.
    pub fn new(cycle: ExposureCycle, power: PowerRange, trial_window: Duration) -> Self {
        Self {
            cycle,
            power,
            trial_window,
            policy: SweepPolicy::default(),
            log: None,
        }
    }

    /// Replace the power-loop policy.
    pub fn with_policy(mut self, policy: SweepPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Also append every completed point to `log`.
    pub fn with_log(mut self, log: Arc<ResultLog<SweepPoint>>) -> Self {
        self.log = Some(log);
        self
    }

    /// Sweep `frequencies` in order.
    ///
    /// A frequency interrupted by shutdown produces no point. Trials whose RF
    /// configuration or window fails count as not detected.
    pub async fn sweep(
        &self,
        frequencies: &[f64],
        check: &mut dyn DetectionCheck,
    ) -> SweepOutcome {
        let powers = self.power.values();
        let mut outcome = SweepOutcome::default();

        tracing::info!(
            frequencies = frequencies.len(),
            powers = powers.len(),
            policy = ?self.policy,
            "Starting threshold sweep"
        );

        'frequencies: for &frequency_mhz in frequencies {
            let mut lowest: Option<f64> = None;
            let mut missed_after_detection = false;

            for &power_dbm in &powers {
                let detected = match self.trial(frequency_mhz, power_dbm, check).await {
                    Trial::Detected(detected) => detected,
                    Trial::Interrupted => {
                        outcome.cancelled = true;
                        tracing::info!(frequency_mhz, "Sweep cancelled");
                        break 'frequencies;
                    }
                };

                if detected {
                    lowest.get_or_insert(power_dbm);
                    if self.policy == SweepPolicy::EarlyExit {
                        break;
                    }
                } else if lowest.is_some() {
                    missed_after_detection = true;
                }
            }

            if missed_after_detection {
                tracing::warn!(
                    frequency_mhz,
                    "Non-monotonic detection: tag missed at a power above its turn-on point"
                );
            }

            let point = match lowest {
                Some(power_dbm) => SweepPoint {
                    frequency_mhz,
                    power_dbm,
                    detected: true,
                },
                None => SweepPoint {
                    frequency_mhz,
                    power_dbm: 0.0,
                    detected: false,
                },
            };
            if point.detected {
                tracing::info!(frequency_mhz, power_dbm = point.power_dbm, "Turn-on power found");
            } else {
                tracing::info!(frequency_mhz, "Tag not detected in power range");
            }
            if let Some(log) = &self.log {
                log.append(point);
            }
            outcome.points.push(point);
        }

        outcome
    }

    async fn trial(
        &self,
        frequency_mhz: f64,
        power_dbm: f64,
        check: &mut dyn DetectionCheck,
    ) -> Trial {
        if self.cycle.shutdown().is_triggered() {
            return Trial::Interrupted;
        }

        let settings = RfSettings {
            frequency_mhz,
            power_dbm,
        };
        if let Err(e) = self.cycle.reader().configure(settings).await {
            tracing::warn!(frequency_mhz, power_dbm, "Failed to configure reader: {}", e);
            return Trial::Detected(false);
        }

        check.reset();
        match self.cycle.open(self.trial_window).await {
            Ok(WindowOutcome::Completed) => Trial::Detected(check.detected(frequency_mhz, power_dbm)),
            Ok(WindowOutcome::Interrupted) => Trial::Interrupted,
            Err(e) => {
                tracing::warn!(frequency_mhz, power_dbm, "Trial window failed: {}", e);
                if self.cycle.settle().await {
                    Trial::Detected(false)
                } else {
                    Trial::Interrupted
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::shutdown::ShutdownSignal;
    use crate::hardware::{ReaderDevice, SimulatedReader, SimulationConfig};

    #[test]
    fn power_values_hit_exact_steps() {
        let values = PowerRange::new(10.0, 30.0, 0.5).unwrap().values();
        assert_eq!(values.len(), 41);
        assert_eq!(values[0], 10.0);
        assert_eq!(values[25], 22.5);
        assert_eq!(*values.last().unwrap(), 30.0);
    }

    #[test]
    fn off_step_maximum_is_not_exceeded() {
        let values = PowerRange::new(10.0, 11.2, 0.5).unwrap().values();
        assert_eq!(values, vec![10.0, 10.5, 11.0]);
    }

    #[test]
    fn rejects_bad_ranges() {
        assert!(PowerRange::new(10.0, 30.0, 0.0).is_err());
        assert!(PowerRange::new(30.0, 10.0, 0.5).is_err());
        assert!(PowerRange::new(10.0, f64::NAN, 0.5).is_err());
    }

    #[test]
    fn tiny_step_is_rejected_without_panicking() {
        assert!(PowerRange::new(0.0, 30.0, 1e-300).is_err());

        let unchecked = PowerRange {
            min_dbm: 0.0,
            max_dbm: 30.0,
            step_dbm: 1e-300,
        };
        assert!(unchecked.values().is_empty());
        assert_eq!(
            PowerRange::new(0.0, 30.0, 0.01).unwrap().values().len(),
            3001
        );
    }

    async fn sweep_with(policy: SweepPolicy) -> (Arc<SimulatedReader>, ThresholdSweep) {
        let reader = Arc::new(SimulatedReader::new(SimulationConfig {
            tags: Vec::new(),
            ..Default::default()
        }));
        reader.connect().await.unwrap();
        let cycle = ExposureCycle::new(reader.clone(), ShutdownSignal::new(), Duration::ZERO);
        let sweep = ThresholdSweep::new(
            cycle,
            PowerRange::new(10.0, 30.0, 0.5).unwrap(),
            Duration::from_millis(400),
        )
        .with_policy(policy);
        (reader, sweep)
    }

    #[tokio::test(start_paused = true)]
    async fn early_exit_records_first_detecting_power() {
        let (reader, sweep) = sweep_with(SweepPolicy::EarlyExit).await;
        let mut oracle = |f: f64, p: f64| f == 915.0 && p >= 22.5;

        let outcome = sweep.sweep(&[915.0, 920.0], &mut oracle).await;

        assert!(!outcome.cancelled);
        assert_eq!(
            outcome.points,
            vec![
                SweepPoint {
                    frequency_mhz: 915.0,
                    power_dbm: 22.5,
                    detected: true
                },
                SweepPoint {
                    frequency_mhz: 920.0,
                    power_dbm: 0.0,
                    detected: false
                },
            ]
        );
        // 26 trials at 915 MHz, 41 at 920 MHz
        assert_eq!(reader.windows_opened(), 26 + 41);
    }

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn full_range_keeps_lowest_and_flags_non_monotonic() {
        let (reader, sweep) = sweep_with(SweepPolicy::FullRange).await;
        // Detected at 20 dBm and again from 25 dBm, missed in between
        let mut oracle = |_f: f64, p: f64| p == 20.0 || p >= 25.0;

        let outcome = sweep.sweep(&[915.0], &mut oracle).await;

        assert_eq!(outcome.points.len(), 1);
        assert_eq!(outcome.points[0].power_dbm, 20.0);
        assert!(outcome.points[0].detected);
        assert_eq!(reader.windows_opened(), 41);
        assert!(logs_contain("Non-monotonic detection"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_configuration_counts_as_miss() {
        let reader = Arc::new(SimulatedReader::new(SimulationConfig::default()));
        reader.connect().await.unwrap();
        let cycle = ExposureCycle::new(reader.clone(), ShutdownSignal::new(), Duration::ZERO);
        // Simulated reader rejects anything above 33 dBm
        let sweep = ThresholdSweep::new(
            cycle,
            PowerRange::new(34.0, 35.0, 1.0).unwrap(),
            Duration::from_millis(100),
        );

        let mut always = |_f: f64, _p: f64| true;
        let outcome = sweep.sweep(&[915.0], &mut always).await;
        assert_eq!(
            outcome.points,
            vec![SweepPoint {
                frequency_mhz: 915.0,
                power_dbm: 0.0,
                detected: false
            }]
        );
        assert_eq!(reader.windows_opened(), 0);
    }
}
