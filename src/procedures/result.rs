//! Procedure results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Outcome of one procedure run, common to every procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureResult {
    /// Procedure that produced this result
    pub procedure_type: String,
    /// Unique execution ID
    pub execution_id: Uuid,
    /// Whether the procedure reached its goal
    pub success: bool,
    /// Whether shutdown stopped the run early
    pub cancelled: bool,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Run time
    pub duration: Duration,
    /// Result files written
    #[serde(default)]
    pub outputs: Vec<PathBuf>,
    /// Non-fatal problems encountered along the way
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ProcedureResult {
    /// Fresh, not yet successful result.
    pub fn begin(procedure_type: impl Into<String>, execution_id: Uuid) -> Self {
        Self {
            procedure_type: procedure_type.into(),
            execution_id,
            success: false,
            cancelled: false,
            started_at: Utc::now(),
            duration: Duration::ZERO,
            outputs: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Record and log a non-fatal problem.
    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        tracing::warn!(procedure = %self.procedure_type, "{}", warning);
        self.warnings.push(warning);
    }

    /// Human-readable one-line summary
    pub fn summary(&self) -> String {
        let status = if self.cancelled {
            "CANCELLED"
        } else if self.success {
            "SUCCESS"
        } else {
            "INCOMPLETE"
        };
        format!(
            "{} [{}] {} in {:.1}s, {} file(s) written, {} warning(s)",
            self.procedure_type,
            self.execution_id,
            status,
            self.duration.as_secs_f64(),
            self.outputs.len(),
            self.warnings.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_reports_status() {
        let mut result = ProcedureResult::begin("turn_on", Uuid::nil());
        assert!(result.summary().contains("INCOMPLETE"));

        result.success = true;
        result.outputs.push(PathBuf::from("data/turn_on_power.csv"));
        let summary = result.summary();
        assert!(summary.starts_with("turn_on [00000000-0000-0000-0000-000000000000] SUCCESS"));
        assert!(summary.contains("1 file(s)"));

        result.cancelled = true;
        assert!(result.summary().contains("CANCELLED"));
    }
}
