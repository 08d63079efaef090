//! Structured logging setup.
//!
//! One call wires the `tracing-subscriber` registry for the whole
//! process: a level filter (the config value, unless `RUST_LOG` is set),
//! JSON or pretty stdout output, and optionally a daily-rolling log file
//! that always gets JSON.

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// JSON lines with flattened fields, for log shipping.
    #[default]
    Json,
    /// Human-readable output for interactive use.
    Pretty,
}

/// Rolling file output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFileConfig {
    /// Directory to write log files into.
    pub directory: String,
    /// File name prefix.
    #[serde(default = "default_file_prefix")]
    pub prefix: String,
}

fn default_file_prefix() -> String {
    "mutt.log".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default level filter (e.g. `info`, `mutt_pipeline=debug`).
    #[serde(default = "default_level")]
    pub level: String,
    /// Stdout output format.
    #[serde(default)]
    pub format: LogFormat,
    /// Optional daily-rolling file output alongside stdout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<LogFileConfig>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

/// Errors from logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// A global subscriber was already installed.
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

/// Installs the global tracing subscriber.
///
/// The returned guards flush buffered file output on drop; hold them for
/// the life of the process.
pub fn init_logging(config: &LogConfig) -> Result<Vec<WorkerGuard>, LoggingError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let stdout: BoxedLayer = match config.format {
        LogFormat::Json => Box::new(fmt::layer().with_target(true).json().flatten_event(true)),
        LogFormat::Pretty => Box::new(fmt::layer().with_target(true)),
    };

    let mut guards = Vec::new();
    let mut layers = vec![stdout];
    if let Some(file) = &config.file {
        let appender = tracing_appender::rolling::daily(&file.directory, &file.prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        layers.push(Box::new(
            fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .json()
                .flatten_event(true),
        ));
    }

    // The boxed layers are typed against the bare registry, so the filter
    // goes on last; an `EnvFilter` gates events globally wherever it sits
    // in the stack.
    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(guards)
}
