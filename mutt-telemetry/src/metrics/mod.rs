//! Pipeline metrics catalog and Prometheus export.
//!
//! Counters, gauges, and histograms are recorded through the `metrics`
//! facade via [`MuttMetrics`]; this module owns the process-wide
//! Prometheus recorder they land in. With `expose_endpoint` set the
//! recorder also serves a scrape endpoint; either way [`render_metrics`]
//! renders the current values as Prometheus text.

mod config;
mod recorder;

pub use config::MetricsConfig;
pub use recorder::MuttMetrics;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tracing::error;

static RECORDER: OnceLock<PrometheusHandle> = OnceLock::new();

/// Errors from metrics initialization.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// A recorder was already installed for this process.
    #[error("Metrics system already initialized")]
    AlreadyInitialized,

    /// The scrape endpoint address did not parse.
    #[error("Invalid endpoint address '{address}': {reason}")]
    InvalidAddress {
        /// The configured address.
        address: String,
        /// Parse failure description.
        reason: String,
    },

    /// The recorder could not be installed.
    #[error("Metrics initialization failed: {0}")]
    InitializationFailed(String),
}

/// Installs the process-wide Prometheus recorder and registers every
/// pipeline metric description.
///
/// Must run inside a Tokio runtime when the scrape endpoint is enabled;
/// the exporter task is spawned onto it.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    let handle = if config.expose_endpoint {
        let addr: SocketAddr =
            config
                .endpoint_address
                .parse()
                .map_err(|e| MetricsError::InvalidAddress {
                    address: config.endpoint_address.clone(),
                    reason: format!("{e}"),
                })?;
        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(addr)
            .build()
            .map_err(|e| MetricsError::InitializationFailed(e.to_string()))?;
        let handle = recorder.handle();
        metrics::set_global_recorder(recorder).map_err(|_| MetricsError::AlreadyInitialized)?;
        tokio::spawn(async move {
            if let Err(e) = exporter.await {
                error!(error = ?e, "Metrics exporter stopped");
            }
        });
        handle
    } else {
        PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| MetricsError::InitializationFailed(e.to_string()))?
    };

    RECORDER
        .set(handle)
        .map_err(|_| MetricsError::AlreadyInitialized)?;

    MuttMetrics::register();
    Ok(())
}

/// Renders the current metrics in Prometheus text format.
///
/// Empty before [`init_metrics`] has run.
#[must_use]
pub fn render_metrics() -> String {
    RECORDER
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}
