//! RF exposure windows.
//!
//! An exposure window is the only blocking point in every control loop:
//! start emitting, sleep for the window duration while observations arrive on
//! the event pump, stop emitting, then wait a short settle delay so that
//! notifications produced at the end of the window are processed before the
//! caller evaluates its outcome. Both sleeps end early when the shutdown signal
//! fires.

use super::shutdown::ShutdownSignal;
use crate::error::{ProbeError, ProbeResult};
use crate::hardware::ReaderDevice;
use std::sync::Arc;
use std::time::Duration;

/// How a window ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOutcome {
    /// Ran for its full duration.
    Completed,
    /// Shutdown was requested before or during the window.
    Interrupted,
}

/// Opens exposure windows on one reader.
#[derive(Clone)]
pub struct ExposureCycle {
    reader: Arc<dyn ReaderDevice>,
    shutdown: ShutdownSignal,
    settle: Duration,
}

impl ExposureCycle {
    /// Cycle on `reader`; every window is followed by `settle`.
    pub fn new(reader: Arc<dyn ReaderDevice>, shutdown: ShutdownSignal, settle: Duration) -> Self {
        Self {
            reader,
            shutdown,
            settle,
        }
    }

    /// Reader the windows open on.
    pub fn reader(&self) -> &Arc<dyn ReaderDevice> {
        &self.reader
    }

    /// Signal that interrupts windows and settle delays.
    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Run one window of `duration` followed by the settle delay.
    ///
    /// A failure to start or stop emitting is returned as
    /// [`ProbeError::Device`]; RF is stopped on a best-effort basis before
    /// returning in every case.
    pub async fn open(&self, duration: Duration) -> ProbeResult<WindowOutcome> {
        if self.shutdown.is_triggered() {
            return Ok(WindowOutcome::Interrupted);
        }

        if let Err(e) = self.reader.start_exposure().await {
            // Some readers leave RF half-enabled after a failed start
            let _ = self.reader.stop_exposure().await;
            return Err(ProbeError::device(e));
        }
        tracing::trace!(window_ms = duration.as_millis() as u64, "Exposure window open");

        let outcome = tokio::select! {
            _ = tokio::time::sleep(duration) => WindowOutcome::Completed,
            _ = self.shutdown.triggered() => WindowOutcome::Interrupted,
        };

        if let Err(e) = self.reader.stop_exposure().await {
            if outcome == WindowOutcome::Interrupted {
                tracing::warn!("Failed to stop exposure during shutdown: {}", e);
                return Ok(outcome);
            }
            return Err(ProbeError::device(e));
        }

        if outcome == WindowOutcome::Completed && !self.settle().await {
            return Ok(WindowOutcome::Interrupted);
        }
        Ok(outcome)
    }

    /// Sleep for the settle delay. Returns false if shutdown interrupted it.
    pub async fn settle(&self) -> bool {
        if self.settle.is_zero() {
            return !self.shutdown.is_triggered();
        }
        tokio::select! {
            _ = tokio::time::sleep(self.settle) => true,
            _ = self.shutdown.triggered() => false,
        }
    }
}
