//! Structured logging using the tracing crate
//!
//! Logging is built once at startup into a [`LogHandle`] and handed to the
//! components that need it; nothing is installed as a process-wide global.
//! Records go to the console and to a size-bounded rotating file.
//!
//! ## Environment Variables
//!
//! - `LOG_LEVEL`: Log level (ERROR, WARN, INFO, DEBUG, TRACE) - defaults to INFO
//! - `LOG_FORMAT`: Output format (text, json, pretty, compact) - defaults to text
//! - `RUST_LOG`: Override log filtering (follows env_logger format)
//!
//! ## Examples
//!
//! ```bash
//! # Default line format on console and in /logs/shtc3_publisher.log
//! LOG_LEVEL=INFO ./shtc3-publisher
//!
//! # JSON lines for log shipping
//! LOG_FORMAT=json ./shtc3-publisher
//! ```

use super::rotating_file::RotatingFileWriter;
use crate::config::LoggingSection;
use std::env;
use std::path::PathBuf;
use thiserror::Error;
use tracing::dispatcher::DefaultGuard;
use tracing::{Dispatch, Level};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// `timestamp LEVEL component: message` lines
    Text,
    /// JSON format for structured logging (machine-readable)
    Json,
    /// Pretty format with colors and indentation (human-readable)
    Pretty,
    /// Compact format with colors but minimal spacing (terminal-friendly)
    Compact,
}

impl LogFormat {
    /// Parse log format from string
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Text,
        }
    }
}

/// Parse a level name, falling back to INFO
pub fn parse_level(s: &str) -> Level {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" => Level::WARN,
        "INFO" => Level::INFO,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Rotating file destination
#[derive(Debug, Clone, PartialEq)]
pub struct FileSink {
    pub path: PathBuf,
    pub max_bytes: u64,
    pub backups: usize,
}

impl From<&LoggingSection> for FileSink {
    fn from(section: &LoggingSection) -> Self {
        Self {
            path: section.file.clone(),
            max_bytes: section.max_bytes,
            backups: section.backups,
        }
    }
}

/// Everything needed to build a [`LogHandle`]
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingOptions {
    pub level: Level,
    pub format: LogFormat,
    pub console: bool,
    pub file: Option<FileSink>,
}

impl LoggingOptions {
    /// Level and format from `LOG_LEVEL` / `LOG_FORMAT`, file from the config section
    pub fn from_env(section: &LoggingSection) -> Self {
        let level = parse_level(&env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()));
        let format = LogFormat::parse(&env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()));

        Self {
            level,
            format,
            console: true,
            file: Some(FileSink::from(section)),
        }
    }

    /// Console output only
    pub fn console_only(level: Level, format: LogFormat) -> Self {
        Self {
            level,
            format,
            console: true,
            file: None,
        }
    }

    /// Raise verbosity by the number of `-v` flags
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        self.level = match verbose {
            0 => self.level,
            1 => self.level.max(Level::DEBUG),
            _ => Level::TRACE,
        };
        self
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to open log file {path}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid log filter directive: {0}")]
    InvalidFilter(String),
}

/// Explicit logging context
///
/// Wraps a `Dispatch` so callers decide where it applies: `main` sets it as
/// the thread default for startup, the publish loop runs its future under it.
#[derive(Clone, Debug)]
pub struct LogHandle {
    dispatch: Dispatch,
}

impl LogHandle {
    pub fn from_dispatch(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// Handle that discards everything
    pub fn disabled() -> Self {
        Self {
            dispatch: Dispatch::none(),
        }
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Use this handle for the current thread until the guard drops
    pub fn set_default(&self) -> DefaultGuard {
        tracing::dispatcher::set_default(&self.dispatch)
    }
}

fn build_filter(level: Level) -> Result<EnvFilter, LoggingError> {
    // Allow RUST_LOG to override
    if let Ok(rust_log) = env::var("RUST_LOG") {
        return EnvFilter::try_new(&rust_log).map_err(|e| LoggingError::InvalidFilter(e.to_string()));
    }

    let quiet = "rumqttc=warn"
        .parse()
        .map_err(|e: tracing_subscriber::filter::ParseError| LoggingError::InvalidFilter(e.to_string()))?;
    Ok(EnvFilter::new(level.to_string()).add_directive(quiet))
}

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
    match format {
        LogFormat::Text => layer.with_target(true).boxed(),
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

/// Build the logging context described by `options`
pub fn build_logging(options: &LoggingOptions) -> Result<LogHandle, LoggingError> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if options.console {
        layers.push(format_layer(options.format, std::io::stderr, true));
    }

    if let Some(sink) = &options.file {
        let writer = RotatingFileWriter::open(&sink.path, sink.max_bytes, sink.backups).map_err(
            |source| LoggingError::FileOpen {
                path: sink.path.clone(),
                source,
            },
        )?;
        layers.push(format_layer(options.format, writer, false));
    }

    let subscriber = tracing_subscriber::registry()
        .with(layers)
        .with(build_filter(options.level)?);

    Ok(LogHandle::from_dispatch(Dispatch::new(subscriber)))
}
