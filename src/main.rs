//! SHTC3 publisher - Main Entry Point
//!
//! Reads the sensor every 15 minutes and publishes the reading over MQTT
//! until SIGINT or SIGTERM.

use clap::{Parser, Subcommand};
use shtc3_publisher::config::{process_env, ConfigError, LoggingSection, PublisherConfig, TuningFile};
use shtc3_publisher::error::error_chain;
use shtc3_publisher::observability::{build_logging, LogHandle, LoggingOptions};
use shtc3_publisher::sensor::SensorError;
use shtc3_publisher::startup;
use shtc3_publisher::transport::mqtt::MqttBroker;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info, warn};

/// SHTC3 temperature/humidity publisher
#[derive(Parser)]
#[command(name = "shtc3-publisher")]
#[command(about = "Publish SHTC3 temperature and humidity readings to an MQTT broker")]
#[command(version)]
struct Cli {
    /// Tuning file (MQTT session, backoff, sensor bus, log file)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Publish readings until interrupted (default)
    Run,
    /// Validate the configuration, print it and exit
    Check,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);

    let tuning = load_tuning(cli.config.as_deref());
    let logging_section = tuning
        .as_ref()
        .map(|t| t.logging.clone())
        .unwrap_or_default();

    // `check` must not touch the log file
    let log = init_logging(&logging_section, cli.verbose, command == Commands::Run);
    let _log_guard = log.set_default();

    info!("Starting SHTC3 publisher v{}", env!("CARGO_PKG_VERSION"));

    let tuning = match tuning {
        Ok(tuning) => tuning,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    match command {
        Commands::Check => {
            let Ok(config) = startup::load_config(process_env, tuning) else {
                process::exit(1);
            };
            if let Err(e) = print_config(&config) {
                error!("Failed to render configuration: {}", e);
                process::exit(1);
            }
        }
        Commands::Run => {
            // Signals first: one arriving while the sensor opens still exits 0
            let shutdown = match startup::listen_for_signals(&log) {
                Ok(shutdown) => shutdown,
                Err(e) => {
                    error!("Failed to install signal handlers: {}", e);
                    process::exit(1);
                }
            };

            let result = startup::run(
                process_env,
                tuning,
                open_sensor,
                |config| MqttBroker::new(config.mqtt.clone()),
                log,
                shutdown,
            )
            .await;
            if result.is_err() {
                process::exit(1);
            }
        }
    }
}

fn load_tuning(path: Option<&Path>) -> Result<TuningFile, ConfigError> {
    match path {
        Some(path) => TuningFile::load_from_file(path),
        None => Ok(TuningFile::default()),
    }
}

/// Console plus rotating file; console only if the file cannot be opened
fn init_logging(section: &LoggingSection, verbose: u8, with_file: bool) -> LogHandle {
    let mut options = LoggingOptions::from_env(section).with_verbosity(verbose);
    if !with_file {
        options.file = None;
    }

    let file_error = match build_logging(&options) {
        Ok(handle) => return handle,
        Err(e) => e,
    };

    options.file = None;
    match build_logging(&options) {
        Ok(handle) => {
            tracing::dispatcher::with_default(handle.dispatch(), || {
                warn!("Logging to console only: {}", error_chain(&file_error));
            });
            handle
        }
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    }
}

fn print_config(config: &PublisherConfig) -> Result<(), toml::ser::Error> {
    println!("Current configuration:");
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

#[cfg(feature = "hardware")]
fn open_sensor(config: &PublisherConfig) -> Result<shtc3_publisher::sensor::Shtc3Sensor, SensorError> {
    shtc3_publisher::sensor::Shtc3Sensor::open(&config.sensor.i2c_device)
}

#[cfg(not(feature = "hardware"))]
fn open_sensor(
    config: &PublisherConfig,
) -> Result<Box<dyn shtc3_publisher::sensor::SensorReader>, SensorError> {
    Err(SensorError::BusOpen {
        device: config.sensor.i2c_device.display().to_string(),
        source: "built without the `hardware` feature".into(),
    })
}
