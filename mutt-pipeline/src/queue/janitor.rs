//! Background reclamation of leases abandoned by crashed workers.
//!
//! The janitor sweeps the in-flight list on a fixed interval. A message
//! whose lease deadline has passed is reclaimed: the observed lease value
//! is removed with a compare-and-delete, so a concurrent heartbeat or a
//! second janitor pass loses cleanly and exactly one pass performs the
//! requeue. The reclaimed message is re-queued with its attempt count
//! incremented - a crash counts as a failed attempt - or dead-lettered
//! when the increment would exceed the attempt budget. As in the
//! transport, the requeue is written before the in-flight entry is
//! removed, so an interrupted sweep duplicates rather than loses.
//!
//! An in-flight entry with *no* lease at all is either a crash between the
//! queue move and the lease write, or a message dequeued microseconds ago
//! whose lease has not landed yet. The janitor reclaims those only after
//! sighting them leaseless on two consecutive sweeps, and claims them by
//! writing a sentinel lease with a set-if-absent - losing that race to a
//! late worker lease write is exactly the safe outcome.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use mutt_core::config::JanitorConfig;
use mutt_core::error::TransportError;
use mutt_core::types::{
    DeadLetterRecord, MessageId, ProcessingLease, QueueMessage, Timestamp,
};
use mutt_telemetry::metrics::MuttMetrics;

use super::transport::{decode, encode, QueueTransport};

/// Counters from one janitor sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JanitorStats {
    /// Messages re-queued after lease expiry.
    pub reclaimed: u64,
    /// Messages dead-lettered because the reclaim exhausted their budget.
    pub dead_lettered: u64,
    /// Delayed messages promoted to the main queue.
    pub promoted: u64,
    /// Orphaned lease keys removed.
    pub orphaned_leases: u64,
}

/// Background reclaimer of expired processing leases.
pub struct LeaseJanitor {
    transport: Arc<QueueTransport>,
    config: JanitorConfig,
    /// Message ids sighted in flight without a lease on the previous sweep.
    leaseless_sightings: Mutex<HashSet<MessageId>>,
}

impl LeaseJanitor {
    /// Creates a janitor sweeping the given transport's key space.
    #[must_use]
    pub fn new(transport: Arc<QueueTransport>, config: JanitorConfig) -> Self {
        Self {
            transport,
            config,
            leaseless_sightings: Mutex::new(HashSet::new()),
        }
    }

    /// Runs sweeps on the configured interval until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            interval_ms = self.config.sweep_interval.as_millis() as u64,
            "Lease janitor started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(stats) if stats.reclaimed > 0 || stats.dead_lettered > 0 => {
                            info!(
                                reclaimed = stats.reclaimed,
                                dead_lettered = stats.dead_lettered,
                                promoted = stats.promoted,
                                "Janitor sweep reclaimed messages"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Janitor sweep failed; will retry"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Lease janitor stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Performs one reclamation sweep.
    pub async fn sweep(&self) -> Result<JanitorStats, TransportError> {
        let mut stats = JanitorStats {
            promoted: self.transport.promote_due().await?,
            ..JanitorStats::default()
        };
        if stats.promoted > 0 {
            MuttMetrics::janitor_promoted(stats.promoted);
        }

        let store = self.transport.store();
        let keys = self.transport.keys();
        let now = Timestamp::now();
        let entries = store.list_range(&keys.inflight()).await?;

        let mut seen_this_sweep: HashSet<MessageId> = HashSet::new();

        for raw in entries {
            let message: QueueMessage = match decode(&raw) {
                Ok(message) => message,
                Err(e) => {
                    error!(error = %e, "Removing undecodable in-flight entry");
                    store.remove_value(&keys.inflight(), &raw).await?;
                    continue;
                }
            };
            let message_id = message.message_id.clone();
            seen_this_sweep.insert(message_id.clone());

            let lease_key = keys.lease(message_id.as_str());
            match store.get(&lease_key).await? {
                Some(lease_raw) => {
                    let expired = match decode::<ProcessingLease>(&lease_raw) {
                        Ok(lease) => lease.is_expired(now),
                        Err(e) => {
                            warn!(
                                message_id = %message_id,
                                error = %e,
                                "Undecodable lease; treating as expired"
                            );
                            true
                        }
                    };

                    if !expired {
                        self.leaseless_sightings.lock().remove(&message_id);
                        continue;
                    }

                    // Only the pass that wins the lease removal requeues.
                    if store.compare_and_delete(&lease_key, &lease_raw).await? {
                        debug!(message_id = %message_id, "Reclaiming expired lease");
                        self.reclaim(&raw, message, &mut stats).await?;
                    }
                }
                None => {
                    // Second consecutive leaseless sighting: claim the
                    // entry by planting a sentinel lease. If a late worker
                    // lease write got there first, the set-if-absent loses
                    // and the worker keeps the message.
                    let second_look = self.leaseless_sightings.lock().remove(&message_id);
                    if !second_look {
                        self.leaseless_sightings.lock().insert(message_id);
                        continue;
                    }

                    let sentinel = ProcessingLease::acquire(
                        message_id.clone(),
                        self.transport.worker_id().clone(),
                        self.transport.queue_config().lease_ttl,
                    );
                    let sentinel_raw = encode(&sentinel)?;
                    if store
                        .compare_and_swap(&lease_key, None, sentinel_raw.clone(), None)
                        .await?
                    {
                        debug!(message_id = %message_id, "Reclaiming leaseless in-flight entry");
                        self.reclaim(&raw, message, &mut stats).await?;
                        store.compare_and_delete(&lease_key, &sentinel_raw).await?;
                    }
                }
            }
        }

        // Forget sightings for messages no longer in flight.
        self.leaseless_sightings
            .lock()
            .retain(|id| seen_this_sweep.contains(id));

        stats.orphaned_leases = self.clean_orphaned_leases(&seen_this_sweep, now).await?;

        if stats.reclaimed > 0 {
            MuttMetrics::janitor_reclaimed(stats.reclaimed);
        }
        Ok(stats)
    }

    /// Re-queues or dead-letters the message with its attempt count
    /// incremented, then removes the old in-flight entry.
    async fn reclaim(
        &self,
        raw: &[u8],
        mut message: QueueMessage,
        stats: &mut JanitorStats,
    ) -> Result<(), TransportError> {
        let store = self.transport.store();
        let keys = self.transport.keys();

        message.record_failure("lease expired; reclaimed by janitor");

        if message.attempt_count < self.transport.queue_config().max_attempts {
            store.push_back(&keys.queue(), encode(&message)?).await?;
            stats.reclaimed += 1;
            debug!(
                message_id = %message.message_id,
                attempt = message.attempt_count,
                "Reclaimed message re-queued"
            );
        } else {
            let record =
                DeadLetterRecord::new(message.clone(), "lease expired; attempt budget exhausted");
            store
                .push_back(&keys.dead_letters(), encode(&record)?)
                .await?;
            MuttMetrics::message_dead_lettered();
            stats.dead_lettered += 1;
            warn!(
                message_id = %message.message_id,
                attempts = message.attempt_count,
                "Reclaimed message dead-lettered"
            );
        }

        store.remove_value(&keys.inflight(), raw).await?;
        Ok(())
    }

    /// Deletes expired lease keys whose message is no longer in flight
    /// (an ack interrupted between its two store operations leaves one).
    async fn clean_orphaned_leases(
        &self,
        inflight_ids: &HashSet<MessageId>,
        now: Timestamp,
    ) -> Result<u64, TransportError> {
        let store = self.transport.store();
        let keys = self.transport.keys();
        let mut removed = 0u64;

        for key in store.scan(&keys.lease_prefix()).await? {
            let Some(raw) = store.get(&key).await? else {
                continue;
            };
            let Ok(lease) = decode::<ProcessingLease>(&raw) else {
                continue;
            };
            // Fresh leases are left alone: the owning message may have
            // been dequeued after this sweep's in-flight snapshot.
            if inflight_ids.contains(&lease.message_id) || !lease.is_expired(now) {
                continue;
            }
            if store.compare_and_delete(&key, &raw).await? {
                debug!(message_id = %lease.message_id, "Removed orphaned lease");
                removed += 1;
            }
        }
        Ok(removed)
    }
}
