//! Metrics configuration.

use serde::{Deserialize, Serialize};

/// Metrics export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether to expose a Prometheus scrape endpoint.
    #[serde(default = "default_expose")]
    pub expose_endpoint: bool,
    /// Listen address for the scrape endpoint.
    #[serde(default = "default_address")]
    pub endpoint_address: String,
}

fn default_expose() -> bool {
    false
}

fn default_address() -> String {
    "127.0.0.1:9155".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            expose_endpoint: default_expose(),
            endpoint_address: default_address(),
        }
    }
}
