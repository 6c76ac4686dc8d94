//! Reader procedures.
//!
//! Each procedure is a complete run against one reader:
//!
//! | Procedure        | What it does                                          | Output            |
//! |------------------|-------------------------------------------------------|-------------------|
//! | `inventory`      | one window, log every accepted observation            | `tags_*`          |
//! | `trigger_ops`    | EM4152 config write + read, submitted once on sight   | `taglog_*`, `op_results_*` |
//! | `sensor_retry`   | humidity read with escalating exposure windows        | `retry_attempts_*`|
//! | `turn_on`        | turn-on power per frequency                           | `turn_on_power_*` |
//! | `sensor_monitor` | Magnus-S3 sensor codes until timeout                  | `sensor_codes_*`  |
//!
//! # Lifecycle
//!
//! ```text
//! connect ──(fail: ProbeError::Connection, nothing written)
//!    │
//! subscribe + spawn event pump
//!    │
//! control loop (exposure windows, stops early on shutdown)
//!    │
//! drain pump → stop RF + disconnect (best effort) → flush result logs
//! ```
//!
//! Cancellation is not an error: the procedure returns normally with
//! [`ProcedureResult::cancelled`] set and logs that are complete up to the
//! cancellation point.

pub mod inventory;
pub mod result;
pub mod sensor_monitor;
pub mod sensor_retry;
pub mod trigger_ops;
pub mod turn_on;

pub use result::ProcedureResult;

use crate::data::{timestamped_path, CsvRecord, RecordSink, ResultLog};
use crate::error::{ProbeError, ProbeResult};
use crate::experiment::ShutdownSignal;
use crate::hardware::ReaderDevice;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Pause after a window so that end-of-window notifications are processed.
pub const EVENT_SETTLE: Duration = Duration::from_millis(100);

/// Everything a procedure needs to run.
#[derive(Clone)]
pub struct ProcedureContext {
    reader: Arc<dyn ReaderDevice>,
    sink: Arc<dyn RecordSink>,
    output_dir: PathBuf,
    shutdown: ShutdownSignal,
    execution_id: Uuid,
}

impl ProcedureContext {
    /// Context with a fresh execution id.
    pub fn new(
        reader: Arc<dyn ReaderDevice>,
        sink: Arc<dyn RecordSink>,
        output_dir: impl Into<PathBuf>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            reader,
            sink,
            output_dir: output_dir.into(),
            shutdown,
            execution_id: Uuid::new_v4(),
        }
    }

    /// Reader every procedure step runs against.
    pub fn reader(&self) -> &Arc<dyn ReaderDevice> {
        &self.reader
    }

    /// Cancellation signal.
    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Directory result logs are written to.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Id shared by the result and every log span of this run.
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// New result log at `<output_dir>/<stem>_<timestamp>.csv`.
    pub fn log<R: CsvRecord>(&self, stem: &str) -> Arc<ResultLog<R>> {
        Arc::new(ResultLog::new(
            timestamped_path(&self.output_dir, stem),
            Arc::clone(&self.sink),
        ))
    }

    /// Connect, or fail the session before any window opens.
    pub(crate) async fn connect(&self) -> ProbeResult<()> {
        self.reader.connect().await.map_err(|e| {
            tracing::error!("Failed to connect to reader: {}", e);
            ProbeError::connection(e)
        })
    }

    /// Stop RF and disconnect, logging failures.
    pub(crate) async fn release(&self) {
        if let Err(e) = self.reader.stop_exposure().await {
            tracing::warn!("Failed to stop exposure during teardown: {}", e);
        }
        if let Err(e) = self.reader.disconnect().await {
            tracing::warn!("Failed to disconnect reader: {}", e);
        }
    }
}

/// Flush `log` and record the written file (or the failure) in `result`.
pub(crate) fn finalize_log<R: CsvRecord>(log: &ResultLog<R>, result: &mut ProcedureResult) {
    match log.flush_and_close() {
        Ok(_) => result.outputs.push(log.destination().to_path_buf()),
        Err(e) => result.warn(format!(
            "Failed to write '{}': {}",
            log.destination().display(),
            e
        )),
    }
}

/// Stamp the run time and log the summary.
pub(crate) fn complete(mut result: ProcedureResult) -> ProcedureResult {
    result.duration = (chrono::Utc::now() - result.started_at)
        .to_std()
        .unwrap_or_default();
    tracing::info!("{}", result.summary());
    result
}
