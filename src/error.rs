//! Custom error types for the probe.
//!
//! This module defines the primary error type, `ProbeError`, for the whole crate.
//! Using the `thiserror` crate, it separates the failure classes the control loops
//! care about:
//!
//! - **`Config`** / **`Configuration`**: the layered configuration could not be
//!   extracted, or it extracted but failed semantic validation.
//! - **`Connection`**: the reader could not be reached or configured when a session
//!   opened. Fatal: the session aborts before any exposure window opens.
//! - **`Device`**: a single exposure window, RF configuration or operation
//!   submission failed. Transient: the retry loop moves to its next attempt and the
//!   sweep records the trial as not detected.
//! - **`InvalidEpc`**: a target identifier was not hexadecimal.
//! - **`Io`** / **`Csv`**: persistence failures when a result log is finalized.
//! - **`Cancelled`**: an external interrupt stopped the run. Callers treat this as
//!   a clean shutdown path rather than a failure.
//!
//! Malformed timestamps never show up here; the normalizer absorbs them.

use thiserror::Error;

/// Convenience alias for results using the probe error type.
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

/// Every error the probe reports.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// A configuration source could not be read or extracted.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// A loaded value is out of range.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding failure.
    #[cfg(feature = "storage_csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The reader could not be reached; the session ends before any window.
    #[error("Reader connection failed: {0}")]
    Connection(String),

    /// A single window, configure or submission call failed.
    #[error("Reader error: {0}")]
    Device(String),

    /// EPC text that is empty or not hexadecimal.
    #[error("Invalid EPC '{0}': expected hexadecimal digits")]
    InvalidEpc(String),

    /// The operation needs a cargo feature this build lacks.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),

    /// Shutdown was requested.
    #[error("Run cancelled: {0}")]
    Cancelled(String),
}

impl ProbeError {
    /// Wrap a device-layer failure that the control loop can recover from.
    pub fn device(err: impl std::fmt::Display) -> Self {
        ProbeError::Device(err.to_string())
    }

    /// Wrap a device-layer failure that aborts the session.
    pub fn connection(err: impl std::fmt::Display) -> Self {
        ProbeError::Connection(err.to_string())
    }

    /// True for failures the retry and sweep loops absorb locally.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProbeError::Device(_))
    }

    /// True when the error represents an external interrupt.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ProbeError::Cancelled(_))
    }
}
