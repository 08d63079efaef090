//! Server configuration module.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use mutt_core::config::MuttConfig;
use mutt_core::error::ConfigError;
use mutt_telemetry::logging::LogConfig;
use mutt_telemetry::metrics::MetricsConfig;

/// Graceful shutdown settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// How long to wait for the in-flight message and background tasks
    /// before exiting anyway.
    #[serde(default = "default_completion_timeout", with = "humantime_serde")]
    pub completion_timeout: Duration,
}

fn default_completion_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            completion_timeout: default_completion_timeout(),
        }
    }
}

/// Complete server configuration.
///
/// The pipeline sections sit at the top level of the file; logging,
/// metrics, and shutdown are server-only concerns.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    /// Pipeline configuration.
    #[serde(flatten)]
    pub pipeline: MuttConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LogConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Shutdown configuration.
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl ServerConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;
        if self.shutdown.completion_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "shutdown.completion_timeout".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}
