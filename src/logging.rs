//! Tracing Infrastructure
//!
//! Installs the global `tracing` subscriber for the probe binary. `RUST_LOG`
//! wins when set; otherwise the configured level applies to this crate and
//! dependencies are held at `warn`.
//!
//! # Example
//! ```no_run
//! use rfid_probe::{config::ProbeConfig, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProbeConfig::load()?;
//! logging::init_from_config(&config)?;
//! tracing::warn!(attempt = 2, "Exposure window failed");
//! # Ok(())
//! # }
//! ```

use crate::config::{LogFormat, ProbeConfig};
use crate::error::{ProbeError, ProbeResult};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Most verbose level emitted by this crate.
    pub level: Level,
    /// Line format.
    pub format: LogFormat,
    /// Emit span open/close events (session pump lifetimes).
    pub span_events: bool,
    /// Include source file and line.
    pub file_and_line: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            span_events: false,
            file_and_line: false,
        }
    }
}

impl LogSettings {
    /// Settings from the `[application]` section.
    pub fn from_probe_config(config: &ProbeConfig) -> ProbeResult<Self> {
        Ok(Self {
            level: parse_log_level(&config.application.log_level)?,
            format: config.application.log_format,
            ..Default::default()
        })
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "warn,{}={}",
                env!("CARGO_CRATE_NAME"),
                self.level.as_str().to_ascii_lowercase()
            ))
        })
    }
}

/// Install the subscriber described by the loaded configuration.
pub fn init_from_config(config: &ProbeConfig) -> ProbeResult<()> {
    init(LogSettings::from_probe_config(config)?)
}

/// Install the global subscriber.
///
/// A subscriber that is already installed is left in place and `Ok(())` is
/// returned.
pub fn init(settings: LogSettings) -> ProbeResult<()> {
    let span_events = if settings.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_span_events(span_events)
        .with_file(settings.file_and_line)
        .with_line_number(settings.file_and_line);
    let layer = match settings.format {
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().with_ansi(false).boxed(),
        LogFormat::Json => base.json().with_ansi(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(settings.filter()))
        .try_init()
        .or_else(|e| {
            if e.to_string()
                .contains("a global default trace dispatcher has already been set")
            {
                Ok(())
            } else {
                Err(ProbeError::Configuration(format!(
                    "Failed to initialize tracing: {e}"
                )))
            }
        })
}

/// Parse a level name, case-insensitively.
pub fn parse_log_level(level: &str) -> ProbeResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(ProbeError::Configuration(format!(
            "Invalid log level '{level}'. Must be one of: trace, debug, info, warn, error"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(parse_log_level("trace").unwrap(), Level::TRACE);
        assert_eq!(parse_log_level("Debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn settings_follow_application_section() {
        let mut config = ProbeConfig::default();
        config.application.log_level = "debug".to_string();
        config.application.log_format = LogFormat::Json;

        let settings = LogSettings::from_probe_config(&config).unwrap();
        assert_eq!(settings.level, Level::DEBUG);
        assert_eq!(settings.format, LogFormat::Json);
    }
}
