//! The delivery worker loop.
//!
//! One sequential loop per replica: dequeue with timeout, evaluate the
//! current ruleset snapshot, and for each produced alert pass the rate
//! limiter and circuit breaker gates before sending. A message is fully
//! resolved - acked, nacked, deferred, dead-lettered, or abandoned on
//! lease loss - before the next dequeue begins. Parallelism comes from
//! running more replicas, never from in-process concurrency, which keeps
//! failure reasoning to one message at a time per process.
//!
//! While a send is in flight the lease is renewed on the heartbeat
//! interval, so a slow downstream call cannot silently outlive the lease.
//! Store unavailability never crashes the loop; the iteration backs off
//! and the store is retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use mutt_core::config::QueueConfig;
use mutt_core::error::{DeliveryError, MuttError, TransportError};
use mutt_core::types::OutboundAlert;
use mutt_rules::{evaluate, RuleSetHolder};
use mutt_telemetry::metrics::MuttMetrics;

use crate::breaker::{BreakerDecision, SharedCircuitBreaker};
use crate::limiter::{RateDecision, SharedRateLimiter};
use crate::queue::{DeferReason, LeasedMessage, QueueTransport};
use crate::sink::{AlertSink, SinkRegistry};

/// Outcome of one send attempt under heartbeat.
enum SendResult {
    Delivered,
    Failed(DeliveryError),
    LeaseLost,
}

/// Single-threaded delivery worker for one replica.
pub struct DeliveryWorker {
    transport: Arc<QueueTransport>,
    rules: Arc<RuleSetHolder>,
    sinks: Arc<SinkRegistry>,
    breaker: Arc<SharedCircuitBreaker>,
    limiter: Arc<SharedRateLimiter>,
    config: QueueConfig,
    send_timeout: Duration,
}

impl DeliveryWorker {
    /// Creates a worker over the given components.
    #[must_use]
    pub fn new(
        transport: Arc<QueueTransport>,
        rules: Arc<RuleSetHolder>,
        sinks: Arc<SinkRegistry>,
        breaker: Arc<SharedCircuitBreaker>,
        limiter: Arc<SharedRateLimiter>,
        config: QueueConfig,
        send_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            rules,
            sinks,
            breaker,
            limiter,
            config,
            send_timeout,
        }
    }

    /// Runs the loop until shutdown.
    ///
    /// On shutdown the worker stops dequeuing new messages and finishes
    /// the message it holds - it never abandons a held lease deliberately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(worker = %self.transport.worker_id(), "Delivery worker started");
        while !*shutdown.borrow() {
            let dequeued = tokio::select! {
                result = self.transport.dequeue(self.config.dequeue_timeout) => result,
                _ = shutdown.changed() => break,
            };
            match dequeued {
                Ok(Some(leased)) => {
                    if let Err(e) = self.process(leased).await {
                        self.handle_iteration_error(e, &mut shutdown).await;
                    }
                }
                Ok(None) => {}
                Err(e) => self.handle_iteration_error(e.into(), &mut shutdown).await,
            }
        }
        info!(worker = %self.transport.worker_id(), "Delivery worker stopped");
    }

    /// Performs one dequeue-and-process iteration.
    ///
    /// Returns whether a message was handled. Intended for tests and
    /// drain tooling; [`run`](Self::run) is the production loop.
    pub async fn poll_once(&self) -> Result<bool, MuttError> {
        match self.transport.dequeue(self.config.dequeue_timeout).await? {
            Some(leased) => {
                self.process(leased).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Fully resolves one leased message.
    async fn process(&self, mut leased: LeasedMessage) -> Result<(), MuttError> {
        let started = Instant::now();
        let message_id = leased.message.message_id.clone();

        let snapshot = self.rules.current();
        let match_started = Instant::now();
        let alerts = evaluate(
            &snapshot,
            &leased.message.event,
            &leased.message.correlation_id,
        );
        MuttMetrics::rule_match_latency(match_started.elapsed().as_secs_f64());

        if alerts.is_empty() {
            debug!(message_id = %message_id, "No alerts produced; acking");
            self.transport.ack(&leased).await?;
            MuttMetrics::message_latency("acked", started.elapsed().as_secs_f64());
            return Ok(());
        }

        for alert in &alerts {
            // Gate order per design: rate limiter first, breaker second.
            if self.limiter.try_acquire(&alert.destination).await? == RateDecision::Deferred {
                self.transport
                    .defer(leased, DeferReason::RateLimited)
                    .await?;
                MuttMetrics::message_latency("deferred", started.elapsed().as_secs_f64());
                return Ok(());
            }

            let decision = self.breaker.check(&alert.destination).await?;
            if let BreakerDecision::Blocked { retry_after } = decision {
                debug!(
                    message_id = %message_id,
                    destination = %alert.destination,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Circuit open; deferring message"
                );
                self.transport
                    .defer(leased, DeferReason::CircuitBlocked)
                    .await?;
                MuttMetrics::message_latency("deferred", started.elapsed().as_secs_f64());
                return Ok(());
            }

            let Some(sink) = self.sinks.get(&alert.destination) else {
                warn!(
                    message_id = %message_id,
                    destination = %alert.destination,
                    "No sink for destination; dead-lettering"
                );
                self.transport
                    .dead_letter(
                        leased,
                        &format!("no sink for destination '{}'", alert.destination),
                    )
                    .await?;
                MuttMetrics::message_latency("dead_lettered", started.elapsed().as_secs_f64());
                return Ok(());
            };

            let send_started = Instant::now();
            let outcome = self
                .send_with_heartbeat(&mut leased, sink.as_ref(), alert)
                .await;
            MuttMetrics::send_latency(
                alert.destination.as_str(),
                send_started.elapsed().as_secs_f64(),
            );

            match outcome {
                SendResult::Delivered => {
                    self.breaker.record_success(&alert.destination).await?;
                    debug!(
                        message_id = %message_id,
                        alert_id = %alert.alert_id,
                        destination = %alert.destination,
                        "Alert delivered"
                    );
                }
                SendResult::Failed(err) if err.is_retryable() => {
                    self.breaker.record_failure(&alert.destination).await?;
                    let error = err.to_string();
                    self.transport.nack(leased, &error).await?;
                    MuttMetrics::message_latency("nacked", started.elapsed().as_secs_f64());
                    return Ok(());
                }
                SendResult::Failed(err) => {
                    // Permanent: straight to the dead letter queue, no
                    // breaker accounting.
                    let error = err.to_string();
                    self.transport.dead_letter(leased, &error).await?;
                    MuttMetrics::message_latency("dead_lettered", started.elapsed().as_secs_f64());
                    return Ok(());
                }
                SendResult::LeaseLost => {
                    warn!(
                        message_id = %message_id,
                        "Lease lost mid-send; abandoning message"
                    );
                    MuttMetrics::message_latency("abandoned", started.elapsed().as_secs_f64());
                    return Ok(());
                }
            }
        }

        self.transport.ack(&leased).await?;
        MuttMetrics::message_latency("acked", started.elapsed().as_secs_f64());
        Ok(())
    }

    /// Runs one send with a timeout while renewing the lease on the
    /// heartbeat interval.
    async fn send_with_heartbeat(
        &self,
        leased: &mut LeasedMessage,
        sink: &dyn AlertSink,
        alert: &OutboundAlert,
    ) -> SendResult {
        let send = tokio::time::timeout(self.send_timeout, sink.send(alert));
        tokio::pin!(send);
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first interval tick completes immediately; consume it so
        // renewals land one interval apart.
        ticker.tick().await;

        loop {
            tokio::select! {
                result = &mut send => {
                    return match result {
                        Ok(Ok(())) => SendResult::Delivered,
                        Ok(Err(e)) => SendResult::Failed(e),
                        Err(_) => SendResult::Failed(DeliveryError::Timeout {
                            timeout_ms: self.send_timeout.as_millis() as u64,
                        }),
                    };
                }
                _ = ticker.tick() => {
                    match self.transport.heartbeat(leased).await {
                        Ok(()) => {}
                        Err(TransportError::LeaseLost { .. }) => return SendResult::LeaseLost,
                        Err(e) => {
                            // A store hiccup is not lease loss; the TTL
                            // still has margin, retry on the next tick.
                            warn!(error = %e, "Heartbeat renewal failed; will retry");
                        }
                    }
                }
            }
        }
    }

    /// Applies the propagation policy for a failed iteration: store
    /// unavailability backs off and retries, anything else is logged.
    async fn handle_iteration_error(&self, error: MuttError, shutdown: &mut watch::Receiver<bool>) {
        if error.is_store_unavailable() {
            warn!(
                error = %error,
                retry_delay_ms = self.config.store_retry_delay.as_millis() as u64,
                "Coordination store unavailable; backing off"
            );
            tokio::select! {
                () = tokio::time::sleep(self.config.store_retry_delay) => {}
                _ = shutdown.changed() => {}
            }
        } else {
            error!(error = %error, "Iteration failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitStatus;
    use crate::sink::MemorySink;
    use crate::store::{CoordinationStore, KeySpace, MemoryStore};
    use mutt_core::config::{BreakerConfig, RateLimitConfig};
    use mutt_core::types::{Destination, Event, EventSeverity, WorkerId};
    use mutt_rules::{MatchCriteria, Rule, RuleAction, RuleSet};

    struct Harness {
        store: Arc<MemoryStore>,
        transport: Arc<QueueTransport>,
        worker: DeliveryWorker,
        moog: Arc<MemorySink>,
        pager: Arc<MemorySink>,
        breaker: Arc<SharedCircuitBreaker>,
    }

    fn emit_rule(name: &str, destination: &str) -> Rule {
        Rule {
            name: name.to_string(),
            enabled: true,
            criteria: MatchCriteria::default(),
            action: RuleAction::Emit {
                destination: destination.to_string(),
                severity: None,
                summary: None,
            },
        }
    }

    fn harness(ruleset: RuleSet, breaker_config: BreakerConfig, rate: RateLimitConfig) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let keys = KeySpace::new("mutt");
        let queue_config = QueueConfig {
            max_attempts: 3,
            backoff: mutt_core::config::BackoffConfig {
                initial_delay: Duration::from_millis(10),
                jitter: 0.0,
                ..mutt_core::config::BackoffConfig::default()
            },
            defer_delay: Duration::from_millis(10),
            dequeue_timeout: Duration::from_millis(30),
            lease_ttl: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(10),
            ..QueueConfig::default()
        };

        let transport = Arc::new(QueueTransport::new(
            Arc::clone(&store) as Arc<dyn CoordinationStore>,
            keys.clone(),
            queue_config.clone(),
            WorkerId::new("w-test"),
        ));
        let breaker = Arc::new(SharedCircuitBreaker::new(
            Arc::clone(&store) as Arc<dyn CoordinationStore>,
            keys.clone(),
            breaker_config,
        ));
        let limiter = Arc::new(SharedRateLimiter::new(
            Arc::clone(&store) as Arc<dyn CoordinationStore>,
            keys,
            rate,
        ));

        let moog = Arc::new(MemorySink::new("moog"));
        let pager = Arc::new(MemorySink::new("pager"));
        let mut sinks = SinkRegistry::new();
        sinks.register(Destination::new("moog"), Arc::clone(&moog) as Arc<dyn AlertSink>);
        sinks.register(Destination::new("pager"), Arc::clone(&pager) as Arc<dyn AlertSink>);

        let worker = DeliveryWorker::new(
            Arc::clone(&transport),
            Arc::new(RuleSetHolder::new(ruleset)),
            Arc::new(sinks),
            Arc::clone(&breaker),
            limiter,
            queue_config,
            Duration::from_secs(2),
        );

        Harness {
            store,
            transport,
            worker,
            moog,
            pager,
            breaker,
        }
    }

    fn default_harness() -> Harness {
        harness(
            RuleSet {
                rules: vec![emit_rule("to-moog", "moog")],
            },
            BreakerConfig::default(),
            RateLimitConfig::default(),
        )
    }

    fn event(id: &str) -> Event {
        Event::new(id, "syslog://sw-01", "link down").with_severity(EventSeverity::Major)
    }

    #[tokio::test]
    async fn test_first_send_success_is_acked_and_terminal() {
        let h = default_harness();
        h.transport.enqueue(event("ev-1")).await.unwrap();

        assert!(h.worker.poll_once().await.unwrap());

        assert_eq!(h.moog.delivered_count(), 1);
        assert_eq!(h.moog.delivered()[0].alert_id, "ev-1/to-moog");
        // Never appears in DLQ or in-flight afterward.
        assert_eq!(h.transport.queue_depth().await.unwrap(), 0);
        assert_eq!(h.transport.inflight_count().await.unwrap(), 0);
        assert_eq!(h.transport.delayed_count().await.unwrap(), 0);
        assert_eq!(h.transport.dlq_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_poll_once_idles_on_empty_queue() {
        let h = default_harness();
        assert!(!h.worker.poll_once().await.unwrap());
    }

    #[tokio::test]
    async fn test_fan_out_delivers_to_every_destination() {
        let h = harness(
            RuleSet {
                rules: vec![emit_rule("to-moog", "moog"), emit_rule("to-pager", "pager")],
            },
            BreakerConfig::default(),
            RateLimitConfig::default(),
        );
        h.transport.enqueue(event("ev-1")).await.unwrap();

        h.worker.poll_once().await.unwrap();
        assert_eq!(h.moog.delivered_count(), 1);
        assert_eq!(h.pager.delivered_count(), 1);
        assert_eq!(h.transport.inflight_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_suppressed_event_is_acked_without_sends() {
        let h = harness(
            RuleSet {
                rules: vec![Rule {
                    name: "suppress".to_string(),
                    enabled: true,
                    criteria: MatchCriteria::default(),
                    action: RuleAction::Suppress,
                }],
            },
            BreakerConfig::default(),
            RateLimitConfig::default(),
        );
        h.transport.enqueue(event("ev-1")).await.unwrap();

        h.worker.poll_once().await.unwrap();
        assert_eq!(h.moog.delivered_count(), 0);
        assert_eq!(h.transport.queue_depth().await.unwrap(), 0);
        assert_eq!(h.transport.dlq_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_nacks_then_succeeds_on_retry() {
        let h = default_harness();
        h.moog.push_transient_failures(1);
        h.transport.enqueue(event("ev-1")).await.unwrap();

        h.worker.poll_once().await.unwrap();
        assert_eq!(h.transport.delayed_count().await.unwrap(), 1);
        assert_eq!(
            h.breaker
                .consecutive_failures(&Destination::new("moog"))
                .await
                .unwrap(),
            1
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        h.worker.poll_once().await.unwrap();
        assert_eq!(h.moog.delivered_count(), 1);
        // Success cleared the streak.
        assert_eq!(
            h.breaker
                .consecutive_failures(&Destination::new("moog"))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_exhausted_retries_dead_letter_with_history() {
        let h = default_harness();
        h.moog.push_transient_failures(3);
        h.transport.enqueue(event("ev-1")).await.unwrap();

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            h.worker.poll_once().await.unwrap();
        }

        let records = h.transport.dead_letters().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message.attempt_count, 3);
        assert_eq!(records[0].message.attempts.len(), 3);
        assert_eq!(h.transport.queue_depth().await.unwrap(), 0);
        assert_eq!(h.transport.delayed_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_permanent_failure_dead_letters_immediately() {
        let h = default_harness();
        h.moog.push_outcome(Err(DeliveryError::Permanent {
            reason: "HTTP 400: bad alert".to_string(),
        }));
        h.transport.enqueue(event("ev-1")).await.unwrap();

        h.worker.poll_once().await.unwrap();

        let records = h.transport.dead_letters().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message.attempt_count, 1);
        // Permanent failures never feed the breaker.
        assert_eq!(
            h.breaker
                .consecutive_failures(&Destination::new("moog"))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_open_breaker_defers_without_consuming_attempts() {
        let h = harness(
            RuleSet {
                rules: vec![emit_rule("to-moog", "moog")],
            },
            BreakerConfig {
                failure_threshold: 2,
                open_duration: Duration::from_secs(60),
            },
            RateLimitConfig::default(),
        );

        // Two transient failures trip the shared breaker.
        h.moog.push_transient_failures(2);
        h.transport.enqueue(event("ev-1")).await.unwrap();
        h.worker.poll_once().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.worker.poll_once().await.unwrap();
        assert_eq!(
            h.breaker.status(&Destination::new("moog")).await.unwrap(),
            CircuitStatus::Open
        );

        // A new message is deferred, not sent and not counted as a failure.
        h.transport.enqueue(event("ev-2")).await.unwrap();
        h.worker.poll_once().await.unwrap();
        assert_eq!(h.moog.delivered_count(), 0);
        assert_eq!(h.transport.delayed_count().await.unwrap(), 2);

        // The deferred message kept attempt_count untouched.
        tokio::time::sleep(Duration::from_millis(30)).await;
        let mut deferred_attempts = None;
        for _ in 0..2 {
            let leased = h
                .transport
                .dequeue(Duration::from_millis(50))
                .await
                .unwrap()
                .unwrap();
            if leased.message.event.id.as_str() == "ev-2" {
                deferred_attempts = Some(leased.message.attempt_count);
            }
        }
        assert_eq!(deferred_attempts, Some(0));
    }

    #[tokio::test]
    async fn test_trial_success_closes_breaker() {
        let h = harness(
            RuleSet {
                rules: vec![emit_rule("to-moog", "moog")],
            },
            BreakerConfig {
                failure_threshold: 1,
                open_duration: Duration::from_millis(30),
            },
            RateLimitConfig::default(),
        );

        h.moog.push_transient_failures(1);
        h.transport.enqueue(event("ev-1")).await.unwrap();
        h.worker.poll_once().await.unwrap();
        assert_eq!(
            h.breaker.status(&Destination::new("moog")).await.unwrap(),
            CircuitStatus::Open
        );

        // After the open window, the retry goes through as a trial and
        // closes the circuit.
        tokio::time::sleep(Duration::from_millis(40)).await;
        h.worker.poll_once().await.unwrap();
        assert_eq!(h.moog.delivered_count(), 1);
        assert_eq!(
            h.breaker.status(&Destination::new("moog")).await.unwrap(),
            CircuitStatus::Closed
        );
        assert_eq!(
            h.breaker
                .consecutive_failures(&Destination::new("moog"))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_rate_limited_message_is_deferred() {
        let h = harness(
            RuleSet {
                rules: vec![emit_rule("to-moog", "moog")],
            },
            BreakerConfig::default(),
            RateLimitConfig {
                max_sends: 1,
                window: Duration::from_secs(60),
            },
        );

        h.transport.enqueue(event("ev-1")).await.unwrap();
        h.transport.enqueue(event("ev-2")).await.unwrap();

        h.worker.poll_once().await.unwrap();
        h.worker.poll_once().await.unwrap();

        assert_eq!(h.moog.delivered_count(), 1);
        assert_eq!(h.transport.delayed_count().await.unwrap(), 1);
        // Not a failure: breaker untouched.
        assert_eq!(
            h.breaker
                .consecutive_failures(&Destination::new("moog"))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_unknown_destination_dead_letters() {
        let h = harness(
            RuleSet {
                rules: vec![emit_rule("to-nowhere", "nowhere")],
            },
            BreakerConfig::default(),
            RateLimitConfig::default(),
        );
        h.transport.enqueue(event("ev-1")).await.unwrap();

        h.worker.poll_once().await.unwrap();
        let records = h.transport.dead_letters().await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].reason.contains("nowhere"));
    }

    #[tokio::test]
    async fn test_store_outage_surfaces_as_unavailable() {
        let h = default_harness();
        h.store.set_offline(true);
        let err = h.worker.poll_once().await.unwrap_err();
        assert!(err.is_store_unavailable());
    }

    #[tokio::test]
    async fn test_run_drains_and_stops_on_shutdown() {
        let h = default_harness();
        h.transport.enqueue(event("ev-1")).await.unwrap();
        h.transport.enqueue(event("ev-2")).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = Arc::new(h.worker);
        let runner = Arc::clone(&worker);
        let handle = tokio::spawn(async move { runner.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker should stop after shutdown")
            .unwrap();

        assert_eq!(h.moog.delivered_count(), 2);
        assert_eq!(h.transport.queue_depth().await.unwrap(), 0);
        assert_eq!(h.transport.inflight_count().await.unwrap(), 0);
    }
}
