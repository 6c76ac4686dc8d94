//! Append-only measurement log.
//!
//! A [`ResultLog`] is shared between the event pump (which appends as
//! notifications arrive) and the control loop (which finalizes it). Records are
//! kept in arrival order and never modified. Finalization hands the whole
//! sequence to a [`RecordSink`] exactly once; later calls are no-ops. A log that
//! is dropped without being finalized makes a best-effort flush so cancelled
//! runs still leave a valid file behind.

use super::storage::RecordSink;
use crate::error::ProbeResult;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// A record kind with a fixed column layout.
pub trait CsvRecord: Send {
    /// Column names, in entity field order.
    const HEADER: &'static [&'static str];

    /// Field values, matching [`CsvRecord::HEADER`].
    fn fields(&self) -> Vec<String>;
}

/// Ordered, append-only log finalized to durable storage once.
pub struct ResultLog<R: CsvRecord> {
    destination: PathBuf,
    sink: Arc<dyn RecordSink>,
    records: Mutex<Vec<R>>,
    closed: AtomicBool,
    flushed: Mutex<bool>,
}

impl<R: CsvRecord> ResultLog<R> {
    /// Empty log that will be written to `destination` through `sink`.
    pub fn new(destination: impl Into<PathBuf>, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            destination: destination.into(),
            sink,
            records: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            flushed: Mutex::new(false),
        }
    }

    fn records(&self) -> MutexGuard<'_, Vec<R>> {
        self.records.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Append a record. Never fails; records arriving after the log was closed
    /// are dropped with a warning.
    pub fn append(&self, record: R) {
        let mut records = self.records();
        if self.closed.load(Ordering::SeqCst) {
            tracing::warn!(
                destination = %self.destination.display(),
                "Result log already closed, dropping late record"
            );
            return;
        }
        records.push(record);
    }

    /// Number of records appended so far.
    pub fn len(&self) -> usize {
        self.records().len()
    }

    /// Whether nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the log no longer accepts records.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Where the log will be written.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Write the finalized log.
    ///
    /// Returns `Ok(true)` when this call wrote the file and `Ok(false)` if it had
    /// already been written. If the sink fails the log stays closed to new
    /// records but unflushed, so a later call retries with the same contents.
    pub fn flush_and_close(&self) -> ProbeResult<bool> {
        let mut flushed = self.flushed.lock().unwrap_or_else(|p| p.into_inner());
        if *flushed {
            return Ok(false);
        }

        let rows: Vec<Vec<String>> = {
            let records = self.records();
            self.closed.store(true, Ordering::SeqCst);
            records.iter().map(CsvRecord::fields).collect()
        };

        self.sink.persist(&self.destination, R::HEADER, &rows)?;
        *flushed = true;
        Ok(true)
    }
}

impl<R: CsvRecord + Clone> ResultLog<R> {
    /// Copy of the records appended so far.
    pub fn snapshot(&self) -> Vec<R> {
        self.records().clone()
    }
}

impl<R: CsvRecord> Drop for ResultLog<R> {
    fn drop(&mut self) {
        let already = *self.flushed.lock().unwrap_or_else(|p| p.into_inner());
        if !already {
            if let Err(e) = self.flush_and_close() {
                tracing::error!(
                    destination = %self.destination.display(),
                    "Failed to flush result log on drop: {}",
                    e
                );
            }
        }
    }
}
