//! # MUTT Telemetry
//!
//! Logging and metrics for the MUTT event pipeline.
//!
//! This crate provides:
//! - Structured logging with JSON and pretty formats over `tracing`
//! - Optional rolling file output
//! - The pipeline metrics catalog and Prometheus export

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

/// Logging configuration and initialization
pub mod logging;

/// Metrics collection and export
pub mod metrics;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::logging::{init_logging, LogConfig, LogFormat};
    pub use crate::metrics::{init_metrics, MetricsConfig, MuttMetrics};
}
