//! Cluster-shared outbound rate limiter.
//!
//! Caps send attempts per destination across all replicas combined. The
//! window counter lives in the coordination store and is advanced with a
//! single atomic increment-with-expiry, so the cap holds no matter how
//! many replicas are draining the queue.
//!
//! The window is fixed, anchored at its first increment (the Redis
//! `INCR` + `EXPIRE NX` idiom). An attempt that would exceed the cap is
//! deferred - it is not a failure and never reaches the circuit breaker's
//! accounting.

use std::sync::Arc;

use tracing::debug;

use mutt_core::config::RateLimitConfig;
use mutt_core::error::StoreError;
use mutt_core::types::Destination;
use mutt_telemetry::metrics::MuttMetrics;

use crate::store::{CoordinationStore, KeySpace};

/// Decision for one send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The attempt fits in the current window.
    Allow,
    /// The window is exhausted; the message must be deferred.
    Deferred,
}

/// Per-destination rate limiter backed by the coordination store.
pub struct SharedRateLimiter {
    store: Arc<dyn CoordinationStore>,
    keys: KeySpace,
    config: RateLimitConfig,
}

impl SharedRateLimiter {
    /// Creates a limiter over the given store and key space.
    #[must_use]
    pub fn new(store: Arc<dyn CoordinationStore>, keys: KeySpace, config: RateLimitConfig) -> Self {
        Self {
            store,
            keys,
            config,
        }
    }

    /// Returns the configured cap per window.
    #[must_use]
    pub fn max_sends(&self) -> u32 {
        self.config.max_sends
    }

    /// Claims one send slot in the destination's current window.
    ///
    /// The increment and the cap check are one atomic operation from the
    /// cluster's point of view: the store returns the post-increment
    /// count, and only counts at or under the cap may send.
    pub async fn try_acquire(&self, destination: &Destination) -> Result<RateDecision, StoreError> {
        let key = self.keys.rate_window(destination.as_str());
        let count = self
            .store
            .incr_with_expiry(&key, self.config.window)
            .await?;

        if count > u64::from(self.config.max_sends) {
            debug!(
                destination = %destination,
                count = count,
                cap = self.config.max_sends,
                "Rate window exhausted; deferring send"
            );
            MuttMetrics::rate_limit_deferred(destination.as_str());
            return Ok(RateDecision::Deferred);
        }
        Ok(RateDecision::Allow)
    }
}
