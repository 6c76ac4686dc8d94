//! Durable storage for finalized result logs.
use crate::error::{ProbeError, ProbeResult};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Destination for a finalized, ordered set of rows.
///
/// Called once per result log with the complete contents; implementations
/// write a header row followed by one row per record.
pub trait RecordSink: Send + Sync {
    /// Persist `rows` under `header` at `destination`.
    fn persist(&self, destination: &Path, header: &[&str], rows: &[Vec<String>]) -> ProbeResult<()>;
}

/// A writer for UTF-8, comma-separated files.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvFileSink;

impl CsvFileSink {
    /// New sink.
    pub fn new() -> Self {
        Self
    }
}

impl RecordSink for CsvFileSink {
    fn persist(&self, destination: &Path, header: &[&str], rows: &[Vec<String>]) -> ProbeResult<()> {
        #[cfg(not(feature = "storage_csv"))]
        {
            let _ = (destination, header, rows);
            return Err(ProbeError::FeatureNotEnabled("storage_csv".to_string()));
        }

        #[cfg(feature = "storage_csv")]
        {
            if let Some(parent) = destination.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            let mut writer = csv::Writer::from_path(destination)?;
            writer.write_record(header)?;
            for row in rows {
                writer.write_record(row)?;
            }
            writer.flush().map_err(ProbeError::Io)?;
            tracing::info!(
                "Wrote {} rows to '{}'.",
                rows.len(),
                destination.display()
            );
            Ok(())
        }
    }
}

/// One persisted file held by a [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedFile {
    /// Path the log was written to.
    pub destination: PathBuf,
    /// Header row.
    pub header: Vec<String>,
    /// Data rows, in order.
    pub rows: Vec<Vec<String>>,
}

/// Sink that keeps everything in memory. Used by tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Mutex<Vec<PersistedFile>>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `persist` call so far, in order.
    pub fn files(&self) -> Vec<PersistedFile> {
        self.files
            .lock()
            .map(|files| files.clone())
            .unwrap_or_default()
    }
}

impl RecordSink for MemorySink {
    fn persist(&self, destination: &Path, header: &[&str], rows: &[Vec<String>]) -> ProbeResult<()> {
        let mut files = self
            .files
            .lock()
            .map_err(|_| ProbeError::Io(std::io::Error::other("memory sink poisoned")))?;
        files.push(PersistedFile {
            destination: destination.to_path_buf(),
            header: header.iter().map(|h| (*h).to_string()).collect(),
            rows: rows.to_vec(),
        });
        Ok(())
    }
}

/// `<dir>/<stem>_<UTC yyyymmdd_hhmmss>.csv`
pub fn timestamped_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!(
        "{}_{}.csv",
        stem,
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    ))
}

#[cfg(all(test, feature = "storage_csv"))]
mod tests {
    use super::*;

    #[test]
    fn csv_sink_writes_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sweep.csv");
        let rows = vec![
            vec!["915".to_string(), "22.5".to_string(), "true".to_string()],
            vec!["920".to_string(), "0".to_string(), "false".to_string()],
        ];

        CsvFileSink::new()
            .persist(&path, &["frequency_mhz", "power_dbm", "detected"], &rows)
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "frequency_mhz,power_dbm,detected\n915,22.5,true\n920,0,false\n"
        );
    }

    #[test]
    fn header_is_written_for_empty_logs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        CsvFileSink::new().persist(&path, &["a", "b"], &[]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n");
    }

    #[test]
    fn timestamped_names() {
        let path = timestamped_path(Path::new("out"), "turn_on_power");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("turn_on_power_"));
        assert!(name.ends_with(".csv"));
        assert_eq!(name.len(), "turn_on_power_".len() + 15 + 4);
    }
}
