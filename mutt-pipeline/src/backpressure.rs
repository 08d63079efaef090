//! Queue-depth backpressure controller and intake gate.
//!
//! The controller polls the main queue depth on an interval and publishes
//! a shedding flag over a watch channel. Shedding starts only after depth
//! has stayed above the high-water mark for the configured sustain
//! duration - a short burst never sheds - and stops as soon as depth
//! falls back below the mark.
//!
//! The intake boundary enqueues through [`IntakeGate`], which turns the
//! flag into explicit rejections the caller can surface to producers.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use mutt_core::config::BackpressureConfig;
use mutt_core::error::TransportError;
use mutt_core::types::{Event, MessageId};
use mutt_telemetry::metrics::MuttMetrics;

use crate::queue::QueueTransport;

/// Watches queue depth and decides when the intake should shed load.
pub struct BackpressureController {
    transport: Arc<QueueTransport>,
    config: BackpressureConfig,
    shed_tx: watch::Sender<bool>,
    // Keep a receiver alive so the watch channel never closes; without a
    // live receiver `shed_tx.send` is a no-op and the flag never flips.
    _shed_rx: watch::Receiver<bool>,
    above_since: Mutex<Option<Instant>>,
}

impl BackpressureController {
    /// Creates a controller over the given transport.
    #[must_use]
    pub fn new(transport: Arc<QueueTransport>, config: BackpressureConfig) -> Self {
        let (shed_tx, shed_rx) = watch::channel(false);
        Self {
            transport,
            config,
            shed_tx,
            _shed_rx: shed_rx,
            above_since: Mutex::new(None),
        }
    }

    /// Returns a receiver for the shedding flag.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shed_tx.subscribe()
    }

    /// Returns whether the intake should currently shed new events.
    #[must_use]
    pub fn is_shedding(&self) -> bool {
        *self.shed_tx.borrow()
    }

    /// Feeds one depth observation into the sustain logic.
    ///
    /// Split out from [`run`](Self::run) so tests can drive observations
    /// without real polling.
    pub fn observe_depth(&self, depth: u64, now: Instant) {
        MuttMetrics::queue_depth(depth);

        if depth > self.config.high_water_mark {
            let mut above_since = self.above_since.lock();
            let since = *above_since.get_or_insert(now);
            let sustained = now.duration_since(since) >= self.config.sustain_duration;
            if sustained && !self.is_shedding() {
                warn!(
                    depth = depth,
                    high_water_mark = self.config.high_water_mark,
                    sustained_ms = self.config.sustain_duration.as_millis() as u64,
                    "Queue depth sustained above high-water mark; shedding new events"
                );
                let _ = self.shed_tx.send(true);
            }
        } else {
            *self.above_since.lock() = None;
            if self.is_shedding() {
                info!(
                    depth = depth,
                    high_water_mark = self.config.high_water_mark,
                    "Queue depth recovered; shedding stopped"
                );
                let _ = self.shed_tx.send(false);
            }
        }
    }

    /// Polls depth on the configured interval until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            high_water_mark = self.config.high_water_mark,
            "Backpressure controller started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.transport.queue_depth().await {
                        Ok(depth) => {
                            self.observe_depth(depth, Instant::now());
                            if let Ok(inflight) = self.transport.inflight_count().await {
                                MuttMetrics::inflight_count(inflight);
                            }
                            if let Ok(delayed) = self.transport.delayed_count().await {
                                MuttMetrics::delayed_count(delayed);
                            }
                            if let Ok(dlq) = self.transport.dlq_len().await {
                                MuttMetrics::dead_letter_count(dlq);
                            }
                        }
                        Err(e) => debug!(error = %e, "Depth poll failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Backpressure controller stopping");
                        return;
                    }
                }
            }
        }
    }
}

/// Result of an intake enqueue attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The event was accepted into the queue.
    Accepted(MessageId),
    /// The event was rejected because the pipeline is shedding load.
    Shed,
}

/// The intake boundary's entry point into the pipeline.
pub struct IntakeGate {
    transport: Arc<QueueTransport>,
    controller: Arc<BackpressureController>,
}

impl IntakeGate {
    /// Creates a gate over the given transport and controller.
    #[must_use]
    pub fn new(transport: Arc<QueueTransport>, controller: Arc<BackpressureController>) -> Self {
        Self {
            transport,
            controller,
        }
    }

    /// Enqueues an event unless the pipeline is shedding.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Unavailable` when the store is
    /// unreachable; the caller decides reject-vs-buffer.
    pub async fn try_enqueue(&self, event: Event) -> Result<EnqueueOutcome, TransportError> {
        if self.controller.is_shedding() {
            MuttMetrics::intake_shed();
            debug!(event_id = %event.id, "Event shed by backpressure");
            return Ok(EnqueueOutcome::Shed);
        }
        let message_id = self.transport.enqueue(event).await?;
        Ok(EnqueueOutcome::Accepted(message_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CoordinationStore, KeySpace, MemoryStore};
    use mutt_core::config::QueueConfig;
    use mutt_core::types::WorkerId;
    use std::time::Duration;

    fn setup(
        high_water_mark: u64,
        sustain: Duration,
    ) -> (Arc<QueueTransport>, Arc<BackpressureController>) {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(QueueTransport::new(
            store as Arc<dyn CoordinationStore>,
            KeySpace::new("mutt"),
            QueueConfig::default(),
            WorkerId::new("w-1"),
        ));
        let controller = Arc::new(BackpressureController::new(
            Arc::clone(&transport),
            BackpressureConfig {
                high_water_mark,
                sustain_duration: sustain,
                poll_interval: Duration::from_millis(10),
            },
        ));
        (transport, controller)
    }

    #[tokio::test]
    async fn test_short_burst_does_not_shed() {
        let (_, controller) = setup(10, Duration::from_secs(30));
        let now = Instant::now();
        controller.observe_depth(50, now);
        assert!(!controller.is_shedding());
    }

    #[tokio::test]
    async fn test_sustained_depth_starts_and_stops_shedding() {
        let (_, controller) = setup(10, Duration::from_millis(50));
        let start = Instant::now();

        controller.observe_depth(20, start);
        assert!(!controller.is_shedding());

        // Still above the mark after the sustain duration: shed.
        controller.observe_depth(20, start + Duration::from_millis(60));
        assert!(controller.is_shedding());

        // Depth recovers: shedding stops.
        controller.observe_depth(5, start + Duration::from_millis(70));
        assert!(!controller.is_shedding());
    }

    #[tokio::test]
    async fn test_dip_below_mark_resets_sustain_clock() {
        let (_, controller) = setup(10, Duration::from_millis(50));
        let start = Instant::now();

        controller.observe_depth(20, start);
        controller.observe_depth(5, start + Duration::from_millis(30));
        // Above again, but the clock restarted.
        controller.observe_depth(20, start + Duration::from_millis(40));
        controller.observe_depth(20, start + Duration::from_millis(60));
        assert!(!controller.is_shedding());

        controller.observe_depth(20, start + Duration::from_millis(100));
        assert!(controller.is_shedding());
    }

    #[tokio::test]
    async fn test_gate_sheds_and_accepts() {
        let (transport, controller) = setup(10, Duration::from_millis(10));
        let gate = IntakeGate::new(Arc::clone(&transport), Arc::clone(&controller));

        let outcome = gate
            .try_enqueue(Event::new("ev-1", "syslog://sw-01", "link down"))
            .await
            .unwrap();
        assert!(matches!(outcome, EnqueueOutcome::Accepted(_)));

        // Force shedding on.
        let start = Instant::now();
        controller.observe_depth(100, start);
        controller.observe_depth(100, start + Duration::from_millis(20));
        assert!(controller.is_shedding());

        let outcome = gate
            .try_enqueue(Event::new("ev-2", "syslog://sw-01", "link down"))
            .await
            .unwrap();
        assert_eq!(outcome, EnqueueOutcome::Shed);
        assert_eq!(transport.queue_depth().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_observes_flag_changes() {
        let (_, controller) = setup(10, Duration::from_millis(10));
        let rx = controller.subscribe();
        assert!(!*rx.borrow());

        let start = Instant::now();
        controller.observe_depth(100, start);
        controller.observe_depth(100, start + Duration::from_millis(20));
        assert!(*rx.borrow());
    }
}
