//! Result logging and persistence.
//!
//! - `result_log`: append-only, flush-once [`ResultLog`]
//! - `records`: column layouts for each logged record kind
//! - `storage`: [`RecordSink`] implementations (CSV files, in-memory)

pub mod records;
pub mod result_log;
pub mod storage;

pub use result_log::{CsvRecord, ResultLog};
pub use storage::{timestamped_path, CsvFileSink, MemorySink, PersistedFile, RecordSink};
