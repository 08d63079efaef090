//! Cluster-shared circuit breaker.
//!
//! Per-destination breaker state lives only in the coordination store, so
//! every replica observes the same circuit. Running the breaker in-process
//! would defeat its purpose under horizontal scaling: each replica would
//! need `failure_threshold` failures of its own before tripping.
//!
//! Two states are stored - Closed and Open. There is no shared half-open
//! state: "open" carries the instant it was opened, and any send attempt
//! observed after `opened_at + open_duration` is a trial that is allowed
//! through. The trial's outcome decides the next state: success closes the
//! circuit and zeroes the failure count, failure restarts the open window.
//!
//! Every transition is a compare-and-swap loop against the stored state
//! blob, so two replicas racing to trip the circuit cannot set conflicting
//! open timers - exactly one CAS wins and the loser re-reads.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use mutt_core::config::BreakerConfig;
use mutt_core::error::StoreError;
use mutt_core::types::{Destination, Timestamp};
use mutt_telemetry::metrics::MuttMetrics;

use crate::store::{Bytes, CoordinationStore, KeySpace};

/// Circuit state stored per destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    /// Normal operation - sends pass through.
    #[default]
    Closed,
    /// Sends are blocked until the open window elapses.
    Open,
}

/// Shared breaker state blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
struct BreakerState {
    status: CircuitStatus,
    consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    opened_at: Option<Timestamp>,
}

/// Decision for one send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    /// The send may proceed. `trial` marks the first attempt after an
    /// open window elapsed; its outcome decides the next state.
    Allow {
        /// Whether this attempt is a post-open trial.
        trial: bool,
    },
    /// The circuit is open; the send must not reach the destination.
    Blocked {
        /// Time until the open window elapses.
        retry_after: Duration,
    },
}

/// State transition produced by recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerTransition {
    /// The failure count moved but the circuit stayed closed.
    None,
    /// The circuit transitioned from closed to open.
    Tripped,
    /// A trial failure restarted the open window.
    Reopened,
}

/// Per-destination circuit breaker backed by the coordination store.
pub struct SharedCircuitBreaker {
    store: Arc<dyn CoordinationStore>,
    keys: KeySpace,
    config: BreakerConfig,
}

impl SharedCircuitBreaker {
    /// Creates a breaker over the given store and key space.
    #[must_use]
    pub fn new(store: Arc<dyn CoordinationStore>, keys: KeySpace, config: BreakerConfig) -> Self {
        Self {
            store,
            keys,
            config,
        }
    }

    /// Decides whether a send to `destination` may proceed right now.
    ///
    /// Does not mutate shared state; blocked attempts leave the failure
    /// count untouched.
    pub async fn check(&self, destination: &Destination) -> Result<BreakerDecision, StoreError> {
        let (_, state) = self.load(destination).await?;
        match state.status {
            CircuitStatus::Closed => Ok(BreakerDecision::Allow { trial: false }),
            CircuitStatus::Open => {
                let opened_at = state.opened_at.unwrap_or(Timestamp::ZERO);
                let reopens_at = opened_at.plus(self.config.open_duration);
                let now = Timestamp::now();
                if now.is_before(reopens_at) {
                    MuttMetrics::breaker_blocked(destination.as_str());
                    Ok(BreakerDecision::Blocked {
                        retry_after: now.until(reopens_at),
                    })
                } else {
                    debug!(destination = %destination, "Open window elapsed; allowing trial send");
                    Ok(BreakerDecision::Allow { trial: true })
                }
            }
        }
    }

    /// Records a successful, non-blocked send.
    ///
    /// Any success resets the consecutive-failure streak; a trial success
    /// also closes the circuit.
    pub async fn record_success(&self, destination: &Destination) -> Result<(), StoreError> {
        loop {
            let (raw, state) = self.load(destination).await?;
            if state == BreakerState::default() {
                return Ok(());
            }
            let was_open = state.status == CircuitStatus::Open;
            if self
                .swap(destination, raw.as_deref(), &BreakerState::default())
                .await?
            {
                if was_open {
                    info!(destination = %destination, "Circuit closed after trial success");
                }
                MuttMetrics::breaker_state(destination.as_str(), false);
                return Ok(());
            }
        }
    }

    /// Records a failed, non-blocked send and returns the transition it
    /// caused.
    pub async fn record_failure(
        &self,
        destination: &Destination,
    ) -> Result<BreakerTransition, StoreError> {
        loop {
            let (raw, state) = self.load(destination).await?;
            let mut next = state.clone();
            next.consecutive_failures = state.consecutive_failures.saturating_add(1);

            let transition = if state.status == CircuitStatus::Open {
                // Post-open trial failure: restart the open window.
                next.opened_at = Some(Timestamp::now());
                BreakerTransition::Reopened
            } else if next.consecutive_failures >= self.config.failure_threshold {
                next.status = CircuitStatus::Open;
                next.opened_at = Some(Timestamp::now());
                BreakerTransition::Tripped
            } else {
                BreakerTransition::None
            };

            if self.swap(destination, raw.as_deref(), &next).await? {
                match transition {
                    BreakerTransition::Tripped => {
                        warn!(
                            destination = %destination,
                            failures = next.consecutive_failures,
                            "Circuit breaker opened"
                        );
                        MuttMetrics::breaker_tripped(destination.as_str());
                        MuttMetrics::breaker_state(destination.as_str(), true);
                    }
                    BreakerTransition::Reopened => {
                        warn!(destination = %destination, "Trial failed; open window restarted");
                        MuttMetrics::breaker_state(destination.as_str(), true);
                    }
                    BreakerTransition::None => {
                        debug!(
                            destination = %destination,
                            failures = next.consecutive_failures,
                            threshold = self.config.failure_threshold,
                            "Breaker failure recorded"
                        );
                    }
                }
                return Ok(transition);
            }
        }
    }

    /// Returns the current consecutive-failure count (for inspection).
    pub async fn consecutive_failures(&self, destination: &Destination) -> Result<u32, StoreError> {
        Ok(self.load(destination).await?.1.consecutive_failures)
    }

    /// Returns the current circuit status (for inspection).
    pub async fn status(&self, destination: &Destination) -> Result<CircuitStatus, StoreError> {
        Ok(self.load(destination).await?.1.status)
    }

    async fn load(
        &self,
        destination: &Destination,
    ) -> Result<(Option<Bytes>, BreakerState), StoreError> {
        let key = self.keys.breaker(destination.as_str());
        match self.store.get(&key).await? {
            Some(raw) => {
                let state =
                    serde_json::from_slice(&raw).map_err(|e| StoreError::CorruptValue {
                        key,
                        reason: e.to_string(),
                    })?;
                Ok((Some(raw), state))
            }
            None => Ok((None, BreakerState::default())),
        }
    }

    async fn swap(
        &self,
        destination: &Destination,
        expected: Option<&[u8]>,
        next: &BreakerState,
    ) -> Result<bool, StoreError> {
        let key = self.keys.breaker(destination.as_str());
        let raw = serde_json::to_vec(next).map_err(|e| StoreError::CorruptValue {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        self.store.compare_and_swap(&key, expected, raw, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn breaker(threshold: u32, open_duration: Duration) -> SharedCircuitBreaker {
        SharedCircuitBreaker::new(
            Arc::new(MemoryStore::new()),
            KeySpace::new("mutt"),
            BreakerConfig {
                failure_threshold: threshold,
                open_duration,
            },
        )
    }

    fn dest() -> Destination {
        Destination::new("moog")
    }

    #[tokio::test]
    async fn test_starts_closed() {
        let breaker = breaker(5, Duration::from_secs(30));
        assert_eq!(breaker.status(&dest()).await.unwrap(), CircuitStatus::Closed);
        assert_eq!(
            breaker.check(&dest()).await.unwrap(),
            BreakerDecision::Allow { trial: false }
        );
    }

    #[tokio::test]
    async fn test_trips_at_threshold_and_blocks() {
        let breaker = breaker(5, Duration::from_secs(30));

        for i in 1..=4u32 {
            let transition = breaker.record_failure(&dest()).await.unwrap();
            assert_eq!(transition, BreakerTransition::None);
            assert_eq!(breaker.consecutive_failures(&dest()).await.unwrap(), i);
        }

        let transition = breaker.record_failure(&dest()).await.unwrap();
        assert_eq!(transition, BreakerTransition::Tripped);
        assert_eq!(breaker.status(&dest()).await.unwrap(), CircuitStatus::Open);

        // The sixth attempt is blocked, not forwarded.
        let decision = breaker.check(&dest()).await.unwrap();
        assert!(matches!(decision, BreakerDecision::Blocked { .. }));
    }

    #[tokio::test]
    async fn test_success_resets_streak() {
        let breaker = breaker(5, Duration::from_secs(30));
        breaker.record_failure(&dest()).await.unwrap();
        breaker.record_failure(&dest()).await.unwrap();
        assert_eq!(breaker.consecutive_failures(&dest()).await.unwrap(), 2);

        breaker.record_success(&dest()).await.unwrap();
        assert_eq!(breaker.consecutive_failures(&dest()).await.unwrap(), 0);

        // Failures must be consecutive to trip.
        for _ in 0..4 {
            breaker.record_failure(&dest()).await.unwrap();
        }
        assert_eq!(breaker.status(&dest()).await.unwrap(), CircuitStatus::Closed);
    }

    #[tokio::test]
    async fn test_trial_allowed_after_open_duration() {
        let breaker = breaker(2, Duration::from_millis(30));
        breaker.record_failure(&dest()).await.unwrap();
        breaker.record_failure(&dest()).await.unwrap();
        assert!(matches!(
            breaker.check(&dest()).await.unwrap(),
            BreakerDecision::Blocked { .. }
        ));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(
            breaker.check(&dest()).await.unwrap(),
            BreakerDecision::Allow { trial: true }
        );
    }

    #[tokio::test]
    async fn test_trial_success_closes_and_zeroes() {
        let breaker = breaker(2, Duration::from_millis(20));
        breaker.record_failure(&dest()).await.unwrap();
        breaker.record_failure(&dest()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(
            breaker.check(&dest()).await.unwrap(),
            BreakerDecision::Allow { trial: true }
        );
        breaker.record_success(&dest()).await.unwrap();

        assert_eq!(breaker.status(&dest()).await.unwrap(), CircuitStatus::Closed);
        assert_eq!(breaker.consecutive_failures(&dest()).await.unwrap(), 0);
        assert_eq!(
            breaker.check(&dest()).await.unwrap(),
            BreakerDecision::Allow { trial: false }
        );
    }

    #[tokio::test]
    async fn test_trial_failure_restarts_open_window() {
        let breaker = breaker(2, Duration::from_millis(40));
        breaker.record_failure(&dest()).await.unwrap();
        breaker.record_failure(&dest()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Trial allowed, then fails.
        assert_eq!(
            breaker.check(&dest()).await.unwrap(),
            BreakerDecision::Allow { trial: true }
        );
        let transition = breaker.record_failure(&dest()).await.unwrap();
        assert_eq!(transition, BreakerTransition::Reopened);

        // Window restarted: blocked again.
        assert!(matches!(
            breaker.check(&dest()).await.unwrap(),
            BreakerDecision::Blocked { .. }
        ));
    }

    #[tokio::test]
    async fn test_destinations_are_independent() {
        let breaker = breaker(1, Duration::from_secs(30));
        breaker.record_failure(&dest()).await.unwrap();
        assert_eq!(breaker.status(&dest()).await.unwrap(), CircuitStatus::Open);

        let other = Destination::new("pager");
        assert_eq!(breaker.status(&other).await.unwrap(), CircuitStatus::Closed);
        assert_eq!(
            breaker.check(&other).await.unwrap(),
            BreakerDecision::Allow { trial: false }
        );
    }

    #[tokio::test]
    async fn test_shared_state_visible_across_instances() {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let config = BreakerConfig {
            failure_threshold: 2,
            open_duration: Duration::from_secs(30),
        };
        let a = SharedCircuitBreaker::new(
            Arc::clone(&store) as Arc<dyn CoordinationStore>,
            KeySpace::new("mutt"),
            config.clone(),
        );
        let b = SharedCircuitBreaker::new(
            store as Arc<dyn CoordinationStore>,
            KeySpace::new("mutt"),
            config,
        );

        // Replica A and replica B each record one failure; the circuit
        // trips because the streak is shared.
        a.record_failure(&dest()).await.unwrap();
        let transition = b.record_failure(&dest()).await.unwrap();
        assert_eq!(transition, BreakerTransition::Tripped);
        assert!(matches!(
            a.check(&dest()).await.unwrap(),
            BreakerDecision::Blocked { .. }
        ));
    }
}
