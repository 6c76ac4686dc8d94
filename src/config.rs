//! Configuration System using Figment
//!
//! Strongly-typed configuration for the probe. Values are layered, later
//! layers overriding earlier ones:
//! 1. Built-in defaults ([`ProbeConfig::default`])
//! 2. `config/probe.toml` (optional)
//! 3. Environment variables prefixed with `RFID_PROBE_`, `__` separating
//!    nested keys
//!
//! Command-line arguments are applied on top by the binary.
//!
//! # Example
//! ```no_run
//! use rfid_probe::config::ProbeConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // RFID_PROBE_RETRY__MAX_ATTEMPTS=8 overrides retry.max_attempts
//! let config = ProbeConfig::load()?;
//! config.validate()?;
//! println!("Reader: {}", config.reader.address);
//! # Ok(())
//! # }
//! ```

use crate::error::{ProbeError, ProbeResult};
use crate::experiment::{PowerRange, RetryPolicy, SweepPolicy};
use crate::hardware::SimulationConfig;
use crate::tag::TargetSpec;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/probe.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "RFID_PROBE_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Reader connection
    pub reader: ReaderConfig,
    /// Target and timing for single-window procedures
    pub session: SessionConfig,
    /// Retry escalation
    pub retry: RetryPolicy,
    /// Turn-on power sweep
    pub sweep: SweepConfig,
    /// Result output
    pub storage: StorageConfig,
    /// Simulated reader scenario
    pub simulation: SimulationConfig,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human-readable
    #[default]
    Pretty,
    /// One line per event
    Compact,
    /// Newline-delimited JSON
    Json,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "RFID Probe".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Reader connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Reader address; `sim` selects the simulated reader.
    pub address: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            address: "sim".to_string(),
        }
    }
}

/// Target and timing for the inventory, trigger and monitor procedures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Target EPC; absent, empty or `*` matches every tag.
    pub target_epc: Option<String>,
    /// Match `target_epc` as a prefix instead of exactly.
    pub prefix_match: bool,
    /// Window length for inventory and trigger runs.
    pub duration_secs: u64,
    /// EPC the sensor-code monitor reads.
    pub monitor_epc: String,
    /// How long the sensor-code monitor runs.
    pub monitor_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_epc: None,
            prefix_match: false,
            duration_secs: 10,
            monitor_epc: "E282403D000203DB0478B057".to_string(),
            monitor_timeout_secs: 15,
        }
    }
}

impl SessionConfig {
    /// Parsed target.
    pub fn target(&self) -> ProbeResult<TargetSpec> {
        match self.target_epc.as_deref() {
            Some(prefix) if self.prefix_match && !prefix.trim().is_empty() => {
                TargetSpec::prefix(prefix)
            }
            raw => TargetSpec::exact(raw),
        }
    }
}

/// Turn-on power sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Tag whose turn-on power is measured.
    pub target_epc: String,
    /// Frequencies to sweep; empty uses the reader's transmit frequencies.
    pub frequencies_mhz: Vec<f64>,
    /// Lowest power tried.
    pub power_min_dbm: f64,
    /// Highest power tried.
    pub power_max_dbm: f64,
    /// Power increment.
    pub power_step_dbm: f64,
    /// Exposure per (frequency, power) trial.
    pub trial_window_ms: u64,
    /// Pause after each trial window before detection is evaluated.
    pub settle_ms: u64,
    /// Early exit or full range.
    pub policy: SweepPolicy,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            target_epc: "000000A93C0000000003000E00000DAD".to_string(),
            frequencies_mhz: Vec::new(),
            power_min_dbm: 10.0,
            power_max_dbm: 30.0,
            power_step_dbm: 0.5,
            trial_window_ms: 400,
            settle_ms: 50,
            policy: SweepPolicy::EarlyExit,
        }
    }
}

impl SweepConfig {
    /// Validated power range.
    pub fn power_range(&self) -> ProbeResult<PowerRange> {
        PowerRange::new(self.power_min_dbm, self.power_max_dbm, self.power_step_dbm)
    }

    /// Length of one trial window.
    pub fn trial_window(&self) -> Duration {
        Duration::from_millis(self.trial_window_ms)
    }
}

/// Result output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for CSV result files
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
        }
    }
}

impl ProbeConfig {
    /// Load from `config/probe.toml` and the environment.
    pub fn load() -> ProbeResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> ProbeResult<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    /// The layered provider chain.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(ProbeConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> ProbeResult<()> {
        let invalid = |msg: String| Err(ProbeError::Configuration(msg));

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.reader.address.trim().is_empty() {
            return invalid("reader.address must not be empty".to_string());
        }

        self.session.target()?;
        crate::tag::Epc::parse(&self.session.monitor_epc)?;
        crate::tag::Epc::parse(&self.sweep.target_epc)?;

        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1".to_string());
        }
        if self.retry.base_window_ms == 0 {
            return invalid("retry.base_window_ms must be positive".to_string());
        }
        if self.sweep.trial_window_ms == 0 {
            return invalid("sweep.trial_window_ms must be positive".to_string());
        }
        self.sweep.power_range()?;
        if let Some(bad) = self
            .sweep
            .frequencies_mhz
            .iter()
            .find(|f| !(f.is_finite() && **f > 0.0))
        {
            return invalid(format!("Invalid sweep frequency {bad} MHz"));
        }

        Ok(())
    }
}
