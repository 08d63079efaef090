//! Pipeline configuration model.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::ConfigError;

/// Coordination store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Prefix for every key the pipeline writes to the store.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_key_prefix() -> String {
    "mutt".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
        }
    }
}

/// Exponential backoff settings for nack requeues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Upper bound on any retry delay.
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
    /// Multiplier applied per retry (typically 2.0).
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Maximum fraction of the delay removed as jitter (0.0 disables).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.25
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

/// Queue transport and lease settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Delivery attempts before a message is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff between failed attempts.
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Fixed requeue delay for breaker-blocked and rate-limited sends.
    #[serde(default = "default_defer_delay", with = "humantime_serde")]
    pub defer_delay: Duration,
    /// Bounded wait of one blocking dequeue poll.
    #[serde(default = "default_dequeue_timeout", with = "humantime_serde")]
    pub dequeue_timeout: Duration,
    /// Lease lifetime without a heartbeat.
    #[serde(default = "default_lease_ttl", with = "humantime_serde")]
    pub lease_ttl: Duration,
    /// Interval between heartbeat renewals while processing.
    #[serde(default = "default_heartbeat_interval", with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    /// Backoff before retrying the store after an unavailability error.
    #[serde(default = "default_store_retry_delay", with = "humantime_serde")]
    pub store_retry_delay: Duration,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_defer_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_dequeue_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_lease_ttl() -> Duration {
    Duration::from_secs(30)
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_store_retry_delay() -> Duration {
    Duration::from_secs(2)
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: BackoffConfig::default(),
            defer_delay: default_defer_delay(),
            dequeue_timeout: default_dequeue_timeout(),
            lease_ttl: default_lease_ttl(),
            heartbeat_interval: default_heartbeat_interval(),
            store_retry_delay: default_store_retry_delay(),
        }
    }
}

/// Lease janitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JanitorConfig {
    /// Interval between reclamation sweeps.
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(15)
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// How long an open circuit blocks sends before allowing a trial.
    #[serde(default = "default_open_duration", with = "humantime_serde")]
    pub open_duration: Duration,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_open_duration() -> Duration {
    Duration::from_secs(30)
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            open_duration: default_open_duration(),
        }
    }
}

/// Per-destination outbound rate cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum sends per window, across all replicas combined.
    #[serde(default = "default_max_sends")]
    pub max_sends: u32,
    /// Window duration.
    #[serde(default = "default_window", with = "humantime_serde")]
    pub window: Duration,
}

fn default_max_sends() -> u32 {
    100
}

fn default_window() -> Duration {
    Duration::from_secs(60)
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_sends: default_max_sends(),
            window: default_window(),
        }
    }
}

/// Backpressure controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackpressureConfig {
    /// Queue depth above which shedding is considered.
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: u64,
    /// How long depth must stay above the mark before shedding starts.
    #[serde(default = "default_sustain_duration", with = "humantime_serde")]
    pub sustain_duration: Duration,
    /// Depth polling interval.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

fn default_high_water_mark() -> u64 {
    1000
}

fn default_sustain_duration() -> Duration {
    Duration::from_secs(30)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            high_water_mark: default_high_water_mark(),
            sustain_duration: default_sustain_duration(),
            poll_interval: default_poll_interval(),
        }
    }
}

/// One outbound webhook destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Destination name referenced by rules.
    pub name: String,
    /// Webhook URL.
    pub url: String,
    /// Extra HTTP headers (authorization etc.).
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Outbound delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Timeout for one downstream send.
    #[serde(default = "default_send_timeout", with = "humantime_serde")]
    pub send_timeout: Duration,
    /// Configured destinations.
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,
}

fn default_send_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            send_timeout: default_send_timeout(),
            destinations: Vec::new(),
        }
    }
}

/// Ruleset loading settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Path to the ruleset file.
    #[serde(default = "default_rules_path")]
    pub path: String,
    /// Whether to watch the file and hot-reload on change.
    #[serde(default = "default_watch")]
    pub watch: bool,
}

fn default_rules_path() -> String {
    "rules.yaml".to_string()
}

fn default_watch() -> bool {
    true
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: default_rules_path(),
            watch: default_watch(),
        }
    }
}

/// Worker replica identity settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkerConfig {
    /// Explicit worker id; generated from the host name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MuttConfig {
    /// Coordination store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Queue transport and lease settings.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Lease janitor settings.
    #[serde(default)]
    pub janitor: JanitorConfig,
    /// Circuit breaker settings.
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Outbound rate cap settings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Backpressure controller settings.
    #[serde(default)]
    pub backpressure: BackpressureConfig,
    /// Outbound delivery settings.
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Ruleset settings.
    #[serde(default)]
    pub rules: RulesConfig,
    /// Worker identity settings.
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl MuttConfig {
    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for the first violated
    /// constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "queue.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.queue.heartbeat_interval.is_zero() || self.queue.lease_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "queue.heartbeat_interval".to_string(),
                reason: "heartbeat interval and lease TTL must be non-zero".to_string(),
            });
        }
        // Two missed heartbeats must still fit inside the lease TTL.
        if self.queue.heartbeat_interval * 2 > self.queue.lease_ttl {
            return Err(ConfigError::InvalidValue {
                field: "queue.lease_ttl".to_string(),
                reason: format!(
                    "lease TTL ({:?}) must be at least twice the heartbeat interval ({:?})",
                    self.queue.lease_ttl, self.queue.heartbeat_interval
                ),
            });
        }
        if self.queue.backoff.initial_delay > self.queue.backoff.max_delay {
            return Err(ConfigError::InvalidValue {
                field: "queue.backoff.initial_delay".to_string(),
                reason: "must not exceed backoff.max_delay".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.queue.backoff.jitter) {
            return Err(ConfigError::InvalidValue {
                field: "queue.backoff.jitter".to_string(),
                reason: "must be within [0.0, 1.0]".to_string(),
            });
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "breaker.failure_threshold".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.breaker.open_duration.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "breaker.open_duration".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.rate_limit.max_sends == 0 || self.rate_limit.window.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit".to_string(),
                reason: "max_sends and window must be non-zero".to_string(),
            });
        }
        if self.janitor.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "janitor.sweep_interval".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.backpressure.sustain_duration.is_zero()
            || self.backpressure.poll_interval.is_zero()
        {
            return Err(ConfigError::InvalidValue {
                field: "backpressure".to_string(),
                reason: "sustain_duration and poll_interval must be non-zero".to_string(),
            });
        }
        for dest in &self.delivery.destinations {
            if dest.name.is_empty() || dest.url.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "delivery.destinations".to_string(),
                    reason: "destination name and url must be non-empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(MuttConfig::default().validate().is_ok());
    }

    #[test]
    fn test_lease_heartbeat_margin() {
        let mut config = MuttConfig::default();
        config.queue.lease_ttl = Duration::from_secs(10);
        config.queue.heartbeat_interval = Duration::from_secs(8);
        assert!(config.validate().is_err());

        config.queue.heartbeat_interval = Duration::from_secs(5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_max_attempts_rejected() {
        let mut config = MuttConfig::default();
        config.queue.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_jitter_bounds() {
        let mut config = MuttConfig::default();
        config.queue.backoff.jitter = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_destination_rejected() {
        let mut config = MuttConfig::default();
        config.delivery.destinations.push(DestinationConfig {
            name: String::new(),
            url: "https://moog.example/api".to_string(),
            headers: HashMap::new(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_roundtrip_with_humantime() {
        let yaml = r"
queue:
  max_attempts: 5
  lease_ttl: 45s
  heartbeat_interval: 15s
breaker:
  failure_threshold: 7
  open_duration: 2m
";
        let config: MuttConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.queue.lease_ttl, Duration::from_secs(45));
        assert_eq!(config.breaker.open_duration, Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }
}
