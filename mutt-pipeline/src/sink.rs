//! Outbound alert sinks.
//!
//! The concrete transport to a downstream incident platform sits behind
//! [`AlertSink`]: one async send returning success, a retryable failure,
//! or a permanent rejection. [`WebhookSink`] is the HTTP POST
//! implementation; [`MemorySink`] captures alerts and plays back scripted
//! outcomes for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use mutt_core::config::{DeliveryConfig, DestinationConfig};
use mutt_core::error::DeliveryError;
use mutt_core::types::{Destination, OutboundAlert};

/// One downstream delivery target.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Returns the sink name.
    fn name(&self) -> &str;

    /// Sends a single alert.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Transient`/`Timeout` for retryable failures
    /// and `DeliveryError::Permanent` for rejections that retrying cannot
    /// fix.
    async fn send(&self, alert: &OutboundAlert) -> Result<(), DeliveryError>;
}

/// Webhook sink delivering alerts via HTTP POST.
pub struct WebhookSink {
    name: String,
    url: String,
    headers: HashMap<String, String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl WebhookSink {
    /// Creates a webhook sink from a destination configuration.
    #[must_use]
    pub fn new(config: &DestinationConfig, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            name: config.name.clone(),
            url: config.url.clone(),
            headers: config.headers.clone(),
            timeout,
            client,
        }
    }

    /// Returns the webhook URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, alert: &OutboundAlert) -> Result<(), DeliveryError> {
        let mut request = self.client.post(&self.url).json(alert);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DeliveryError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            } else {
                DeliveryError::Transient {
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(
                sink = %self.name,
                alert_id = %alert.alert_id,
                status = %status,
                "Alert delivered"
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let hint = body.chars().take(200).collect::<String>();
        Err(DeliveryError::from_status(status.as_u16(), &hint))
    }
}

/// In-memory sink for tests.
///
/// Captures delivered alerts and returns scripted outcomes; with no
/// script queued every send succeeds.
#[derive(Default)]
pub struct MemorySink {
    name: String,
    delivered: RwLock<Vec<OutboundAlert>>,
    outcomes: Mutex<VecDeque<Result<(), DeliveryError>>>,
}

impl MemorySink {
    /// Creates a sink with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delivered: RwLock::new(Vec::new()),
            outcomes: Mutex::new(VecDeque::new()),
        }
    }

    /// Queues the outcome for the next send.
    pub fn push_outcome(&self, outcome: Result<(), DeliveryError>) {
        self.outcomes.lock().push_back(outcome);
    }

    /// Queues `count` transient failures.
    pub fn push_transient_failures(&self, count: usize) {
        for _ in 0..count {
            self.push_outcome(Err(DeliveryError::Transient {
                reason: "HTTP 503".to_string(),
            }));
        }
    }

    /// Returns every successfully delivered alert.
    #[must_use]
    pub fn delivered(&self) -> Vec<OutboundAlert> {
        self.delivered.read().clone()
    }

    /// Returns how many alerts were successfully delivered.
    #[must_use]
    pub fn delivered_count(&self) -> usize {
        self.delivered.read().len()
    }
}

#[async_trait]
impl AlertSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, alert: &OutboundAlert) -> Result<(), DeliveryError> {
        let outcome = self.outcomes.lock().pop_front().unwrap_or(Ok(()));
        if outcome.is_ok() {
            self.delivered.write().push(alert.clone());
        }
        outcome
    }
}

/// Routes destination names to their sinks.
#[derive(Default)]
pub struct SinkRegistry {
    sinks: HashMap<Destination, Arc<dyn AlertSink>>,
}

impl SinkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sinks: HashMap::new(),
        }
    }

    /// Builds webhook sinks for every configured destination.
    #[must_use]
    pub fn from_config(config: &DeliveryConfig) -> Self {
        let mut registry = Self::new();
        for dest in &config.destinations {
            registry.register(
                Destination::new(&dest.name),
                Arc::new(WebhookSink::new(dest, config.send_timeout)),
            );
        }
        registry
    }

    /// Registers a sink under a destination name.
    pub fn register(&mut self, destination: Destination, sink: Arc<dyn AlertSink>) {
        self.sinks.insert(destination, sink);
    }

    /// Looks up the sink for a destination.
    #[must_use]
    pub fn get(&self, destination: &Destination) -> Option<Arc<dyn AlertSink>> {
        self.sinks.get(destination).map(Arc::clone)
    }

    /// Returns the number of registered sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns true if no sinks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}
