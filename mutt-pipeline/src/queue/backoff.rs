//! Exponential backoff for nack requeues.

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use mutt_core::config::BackoffConfig;

/// Backoff policy for delayed-visibility requeues.
///
/// Delays grow exponentially from `initial_delay`, are capped at
/// `max_delay`, and have up to a configured fraction removed as jitter so
/// replicas retrying the same outage do not requeue in lockstep.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    config: BackoffConfig,
}

impl BackoffPolicy {
    /// Creates a new backoff policy with the given configuration.
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Calculates the requeue delay for the given attempt number
    /// (1 for the first failed attempt).
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.config.initial_delay.as_millis() as f64
            * self.config.multiplier.powi(attempt as i32 - 1);
        let capped = base.min(self.config.max_delay.as_millis() as f64);

        let delay_ms = if self.config.jitter > 0.0 {
            let cut: f64 = rand::thread_rng().gen_range(0.0..self.config.jitter);
            capped * (1.0 - cut)
        } else {
            capped
        };

        let delay = Duration::from_millis(delay_ms as u64);
        debug!(
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            "Calculated requeue backoff"
        );
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: f64) -> BackoffPolicy {
        BackoffPolicy::new(BackoffConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter,
        })
    }

    #[test]
    fn test_exponential_growth_without_jitter() {
        let policy = policy(0.0);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn test_cap_at_max_delay() {
        let policy = policy(0.0);
        assert_eq!(policy.delay_for_attempt(20), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_attempt_has_no_delay() {
        assert_eq!(policy(0.0).delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = policy(0.25);
        for _ in 0..50 {
            let delay = policy.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(75));
            assert!(delay <= Duration::from_millis(100));
        }
    }
}
