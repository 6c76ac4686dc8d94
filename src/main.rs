//! CLI Entry Point for rfid-probe
//!
//! Runs one reader procedure and writes its result logs as CSV.
//!
//! # Usage
//!
//! ```bash
//! rfid_probe inventory sim E280B120 --prefix 5
//! rfid_probe trigger sim E282403D000203DB0478B057 10
//! rfid_probe retry sim
//! rfid_probe sweep sim 000000A93C0000000003000E00000DAD
//! rfid_probe sensor sim E282403D000203DB0478B057 15
//! ```
//!
//! Ctrl-C stops the current window, flushes the logs written so far and
//! disconnects the reader.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rfid_probe::config::{ProbeConfig, DEFAULT_CONFIG_PATH};
use rfid_probe::data::{CsvFileSink, RecordSink};
use rfid_probe::experiment::ShutdownSignal;
use rfid_probe::hardware::open_reader;
use rfid_probe::logging;
use rfid_probe::procedures::{
    inventory, sensor_monitor, sensor_retry, trigger_ops, turn_on, ProcedureContext,
    ProcedureResult,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rfid_probe")]
#[command(about = "Tag-event probe for UHF RFID readers", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory for result files
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Positional arguments shared by every procedure.
#[derive(Args)]
struct Positional {
    /// Reader address (`sim` for the simulated reader)
    reader: Option<String>,

    /// Target EPC (`*` or `any` matches every tag)
    target_epc: Option<String>,

    /// Window length or timeout in seconds
    seconds: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log every tag seen during one window
    Inventory {
        #[command(flatten)]
        args: Positional,

        /// Match the target EPC as a prefix
        #[arg(long)]
        prefix: bool,
    },

    /// Configure and read an EM4152 sensor once it is seen
    Trigger {
        #[command(flatten)]
        args: Positional,
    },

    /// Read a humidity sensor with escalating exposure windows
    Retry {
        #[command(flatten)]
        args: Positional,

        /// Number of attempts
        #[arg(long)]
        attempts: Option<u32>,
    },

    /// Measure turn-on power per frequency
    Sweep {
        #[command(flatten)]
        args: Positional,

        /// Scan every power instead of stopping at the first detection
        #[arg(long)]
        full_range: bool,
    },

    /// Log Magnus-S3 sensor codes until the timeout
    Sensor {
        #[command(flatten)]
        args: Positional,
    },
}

impl Positional {
    fn apply(&self, config: &mut ProbeConfig) {
        if let Some(reader) = &self.reader {
            config.reader.address = reader.clone();
        }
        if let Some(seconds) = self.seconds {
            config.session.duration_secs = seconds;
            config.session.monitor_timeout_secs = seconds;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ProbeConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if let Some(level) = &cli.log_level {
        config.application.log_level = level.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.storage.output_dir = dir.clone();
    }
    apply_command(&cli.command, &mut config);
    config.validate().context("Invalid configuration")?;
    logging::init_from_config(&config)?;

    tracing::info!(
        application = %config.application.name,
        reader = %config.reader.address,
        "Starting"
    );

    let shutdown = ShutdownSignal::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, shutting down");
                shutdown.trigger("interrupted by user");
            }
        });
    }

    let reader = open_reader(&config.reader.address, &config.simulation)?;
    let sink: Arc<dyn RecordSink> = Arc::new(CsvFileSink::new());
    let ctx = ProcedureContext::new(reader, sink, config.storage.output_dir.clone(), shutdown);

    let result = match &cli.command {
        Commands::Inventory { .. } => {
            let report = inventory::run(&ctx, &inventory::InventoryParams::from_config(&config)?).await?;
            println!(
                "{} observation(s), {} distinct tag(s)",
                report.observations.len(),
                report.distinct.len()
            );
            for epc in &report.distinct {
                println!("  {epc}");
            }
            report.result
        }
        Commands::Trigger { .. } => {
            let report = trigger_ops::run(&ctx, &trigger_ops::TriggerParams::from_config(&config)?).await?;
            for op in &report.op_results {
                println!(
                    "  op {} {} {} success={} payload={}",
                    op.op_id,
                    op.epc,
                    op.kind,
                    op.success,
                    op.payload_text()
                );
            }
            if let Some(sensor) = report.sensor {
                println!("C_sense = {:.2} ({:?})", sensor.c_sense, sensor.status);
            }
            report.result
        }
        Commands::Retry { .. } => {
            let report =
                sensor_retry::run(&ctx, &sensor_retry::SensorRetryParams::from_config(&config)?).await?;
            match report.humidity {
                Some(reading) => println!(
                    "Humidity {}% after {} attempt(s)",
                    reading.humidity_percent,
                    report.outcome.sessions.len()
                ),
                None => println!("No humidity reading"),
            }
            report.result
        }
        Commands::Sweep { .. } => {
            let report = turn_on::run(&ctx, &turn_on::TurnOnParams::from_config(&config)?).await?;
            println!("frequency_mhz  power_dbm  detected");
            for point in &report.points {
                println!(
                    "{:>13.2}  {:>9.1}  {}",
                    point.frequency_mhz, point.power_dbm, point.detected
                );
            }
            report.result
        }
        Commands::Sensor { .. } => {
            let report =
                sensor_monitor::run(&ctx, &sensor_monitor::MonitorParams::from_config(&config)?).await?;
            println!("{} sensor code(s)", report.readings.len());
            report.result
        }
    };

    print_result(&result);
    Ok(())
}

fn apply_command(command: &Commands, config: &mut ProbeConfig) {
    match command {
        Commands::Inventory { args, prefix } => {
            args.apply(config);
            if let Some(epc) = &args.target_epc {
                config.session.target_epc = Some(epc.clone());
            }
            config.session.prefix_match |= *prefix;
        }
        Commands::Trigger { args } => {
            args.apply(config);
            if let Some(epc) = &args.target_epc {
                config.session.target_epc = Some(epc.clone());
            }
        }
        Commands::Retry { args, attempts } => {
            args.apply(config);
            if let Some(epc) = &args.target_epc {
                config.session.target_epc = Some(epc.clone());
            }
            if let Some(attempts) = attempts {
                config.retry.max_attempts = *attempts;
            }
        }
        Commands::Sweep { args, full_range } => {
            args.apply(config);
            if let Some(epc) = &args.target_epc {
                config.sweep.target_epc = epc.clone();
            }
            if *full_range {
                config.sweep.policy = rfid_probe::experiment::SweepPolicy::FullRange;
            }
        }
        Commands::Sensor { args } => {
            args.apply(config);
            if let Some(epc) = &args.target_epc {
                config.session.monitor_epc = epc.clone();
            }
        }
    }
}

fn print_result(result: &ProcedureResult) {
    println!("{}", result.summary());
    for output in &result.outputs {
        println!("  wrote {}", output.display());
    }
    for warning in &result.warnings {
        println!("  warning: {warning}");
    }
}
