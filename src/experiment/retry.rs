//! Bounded retry with escalating exposure.
//!
//! Attempt `i` opens a window of `base_window_ms + i * step_ms`. After each
//! window (and its settle delay) the success predicate is evaluated; the loop
//! stops at the first success. A failed window counts as a failed attempt and
//! the loop moves on.
//!
//! [`RetryEscalationController::run_with_setup`] adds a registration step that
//! must succeed once before windows open; a rejected registration is a failed
//! attempt too and is tried again on the next one. An optional pre-warm window
//! powers the tag before registration and is not counted as an attempt.

use super::exposure::{ExposureCycle, WindowOutcome};
use crate::data::ResultLog;
use crate::error::ProbeResult;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Attempt budget and window growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Number of windows to try.
    pub max_attempts: u32,
    /// First window duration.
    pub base_window_ms: u64,
    /// Added per attempt.
    pub step_ms: u64,
    /// Pause after each window before the predicate runs.
    pub settle_ms: u64,
    /// Exposure before the first attempt; 0 skips it.
    pub prewarm_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_window_ms: 400,
            step_ms: 200,
            settle_ms: 100,
            prewarm_ms: 0,
        }
    }
}

impl RetryPolicy {
    /// Window duration for attempt `attempt_index`.
    pub fn window_ms(&self, attempt_index: u32) -> u64 {
        self.base_window_ms
            .saturating_add(u64::from(attempt_index).saturating_mul(self.step_ms))
    }

    /// Every window duration the policy allows, in attempt order.
    pub fn window_durations(&self) -> Vec<u64> {
        (0..self.max_attempts).map(|i| self.window_ms(i)).collect()
    }
}

/// One attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySession {
    /// 0-based attempt number.
    pub attempt_index: u32,
    /// Length of this attempt's exposure window.
    pub window_duration_ms: u64,
    /// Whether the success predicate held after the window.
    pub succeeded: bool,
}

/// Result of a retry loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryOutcome {
    /// Whether some attempt satisfied the predicate.
    pub succeeded: bool,
    /// Completed attempts, in order.
    pub sessions: Vec<RetrySession>,
    /// Whether shutdown stopped the loop.
    pub cancelled: bool,
}

/// Drives [`RetryPolicy`] against one reader.
pub struct RetryEscalationController {
    cycle: ExposureCycle,
    policy: RetryPolicy,
    log: Option<Arc<ResultLog<RetrySession>>>,
}

impl RetryEscalationController {
    /// `cycle` should carry the policy's settle delay.
    pub fn new(cycle: ExposureCycle, policy: RetryPolicy) -> Self {
        Self {
            cycle,
            policy,
            log: None,
        }
    }

    /// Also append every completed attempt to `log`.
    pub fn with_log(mut self, log: Arc<ResultLog<RetrySession>>) -> Self {
        self.log = Some(log);
        self
    }

    /// Attempt budget in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run attempts until `success` returns true, attempts run out, or
    /// shutdown is requested. An interrupted window is not recorded.
    pub async fn run<P>(&self, success: P) -> RetryOutcome
    where
        P: FnMut() -> bool,
    {
        self.run_with_setup(|| std::future::ready(Ok(())), success)
            .await
    }

    /// Like [`run`](Self::run), with `setup` called at the start of each
    /// attempt until it succeeds once. An attempt whose setup fails opens no
    /// window and is recorded as failed.
    pub async fn run_with_setup<S, F, P>(&self, mut setup: S, mut success: P) -> RetryOutcome
    where
        S: FnMut() -> F,
        F: Future<Output = ProbeResult<()>>,
        P: FnMut() -> bool,
    {
        let mut outcome = RetryOutcome::default();

        if self.policy.prewarm_ms > 0 && !self.prewarm().await {
            outcome.cancelled = true;
            return outcome;
        }

        let mut prepared = false;
        for attempt_index in 0..self.policy.max_attempts {
            let window_ms = self.policy.window_ms(attempt_index);

            let succeeded = if !prepared && !self.prepare(attempt_index, &mut setup).await {
                if !self.cycle.settle().await {
                    outcome.cancelled = true;
                    break;
                }
                false
            } else {
                prepared = true;
                tracing::info!(
                    attempt = attempt_index + 1,
                    max_attempts = self.policy.max_attempts,
                    window_ms,
                    "Opening exposure window"
                );

                match self.cycle.open(Duration::from_millis(window_ms)).await {
                    Ok(WindowOutcome::Completed) => success(),
                    Ok(WindowOutcome::Interrupted) => {
                        outcome.cancelled = true;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(attempt = attempt_index + 1, "Exposure window failed: {}", e);
                        if !self.cycle.settle().await {
                            outcome.cancelled = true;
                            break;
                        }
                        false
                    }
                }
            };

            let session = RetrySession {
                attempt_index,
                window_duration_ms: window_ms,
                succeeded,
            };
            if let Some(log) = &self.log {
                log.append(session.clone());
            }
            outcome.sessions.push(session);

            if succeeded {
                tracing::info!(attempt = attempt_index + 1, "Success predicate satisfied");
                outcome.succeeded = true;
                break;
            }
        }

        if !outcome.succeeded && !outcome.cancelled {
            tracing::warn!(
                attempts = outcome.sessions.len(),
                "Retry attempts exhausted without success"
            );
        }
        outcome
    }

    /// Pre-warm window. Returns false if shutdown interrupted it; a failed
    /// window is logged and the attempts still run.
    async fn prewarm(&self) -> bool {
        let prewarm_ms = self.policy.prewarm_ms;
        tracing::info!(prewarm_ms, "Pre-warming before the first attempt");
        match self.cycle.open(Duration::from_millis(prewarm_ms)).await {
            Ok(WindowOutcome::Completed) => true,
            Ok(WindowOutcome::Interrupted) => false,
            Err(e) => {
                tracing::warn!("Pre-warm window failed: {}", e);
                self.cycle.settle().await
            }
        }
    }

    async fn prepare<S, F>(&self, attempt_index: u32, setup: &mut S) -> bool
    where
        S: FnMut() -> F,
        F: Future<Output = ProbeResult<()>>,
    {
        match setup().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(attempt = attempt_index + 1, "Attempt setup failed: {}", e);
                false
            }
        }
    }
}
