//! Leased queue transport over the coordination store.
//!
//! Messages live in exactly one of four places: the main queue list, the
//! in-flight list, the delayed-visibility set, or the dead letter queue.
//! Every transfer between them is a single atomic store operation, and the
//! lease key `lease:<message_id>` records which worker owns an in-flight
//! message and until when.
//!
//! Nack, defer, and dead-letter claim the lease with a compare-and-delete
//! before touching the message, so a worker whose lease was reclaimed by
//! the janitor turns into a safe no-op instead of corrupting a redelivery.
//! Transitions write the message's new location before removing the old
//! in-flight entry: a crash in between yields a duplicate, never a loss.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use mutt_core::config::QueueConfig;
use mutt_core::error::TransportError;
use mutt_core::types::{
    DeadLetterRecord, Event, MessageId, ProcessingLease, QueueMessage, Timestamp, WorkerId,
};
use mutt_telemetry::metrics::MuttMetrics;

use crate::store::{Bytes, CoordinationStore, KeySpace};

use super::BackoffPolicy;

/// Why a message was re-queued without consuming a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// The destination's circuit is open.
    CircuitBlocked,
    /// The destination's rate window is exhausted.
    RateLimited,
}

impl DeferReason {
    /// Returns the reason as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CircuitBlocked => "circuit_blocked",
            Self::RateLimited => "rate_limited",
        }
    }
}

/// Outcome of a nack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NackOutcome {
    /// The message was re-queued with delayed visibility.
    Requeued {
        /// Attempt count after the failure was recorded.
        attempt: u32,
        /// Backoff delay before the message becomes visible again.
        delay: Duration,
    },
    /// The message exhausted its attempt budget and was dead-lettered.
    DeadLettered,
    /// The lease was already reclaimed; the janitor owns the redelivery.
    Abandoned,
}

/// A dequeued message together with its processing lease.
///
/// Holds the exact bytes popped from the queue so that ack/nack can remove
/// precisely this in-flight entry, and the exact lease bytes so ownership
/// checks compare against what this worker last wrote.
#[derive(Debug, Clone)]
pub struct LeasedMessage {
    /// The decoded message.
    pub message: QueueMessage,
    /// The lease this worker holds on it.
    pub lease: ProcessingLease,
    pub(crate) raw: Bytes,
    pub(crate) lease_raw: Bytes,
}

/// Queue transport: enqueue, leased dequeue, heartbeat, ack, nack, defer,
/// and dead-letter transfer.
pub struct QueueTransport {
    store: Arc<dyn CoordinationStore>,
    keys: KeySpace,
    config: QueueConfig,
    backoff: BackoffPolicy,
    worker_id: WorkerId,
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Bytes, TransportError> {
    serde_json::to_vec(value).map_err(|e| TransportError::Serialization {
        reason: e.to_string(),
    })
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TransportError> {
    serde_json::from_slice(bytes).map_err(|e| TransportError::Serialization {
        reason: e.to_string(),
    })
}

impl QueueTransport {
    /// Creates a transport bound to one worker identity.
    #[must_use]
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        keys: KeySpace,
        config: QueueConfig,
        worker_id: WorkerId,
    ) -> Self {
        Self {
            backoff: BackoffPolicy::new(config.backoff.clone()),
            store,
            keys,
            config,
            worker_id,
        }
    }

    /// Returns the worker identity this transport leases under.
    #[must_use]
    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    pub(crate) fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    pub(crate) fn keys(&self) -> &KeySpace {
        &self.keys
    }

    pub(crate) fn queue_config(&self) -> &QueueConfig {
        &self.config
    }

    /// Appends a new message wrapping `event` to the main queue.
    ///
    /// Never blocks on consumers. Fails with `TransportError::Unavailable`
    /// when the store is unreachable; the caller decides reject-vs-buffer.
    pub async fn enqueue(&self, event: Event) -> Result<MessageId, TransportError> {
        let message = QueueMessage::wrap(event);
        let raw = encode(&message)?;
        self.store.push_back(&self.keys.queue(), raw).await?;
        MuttMetrics::event_enqueued();
        debug!(
            message_id = %message.message_id,
            event_id = %message.event.id,
            "Event enqueued"
        );
        Ok(message.message_id)
    }

    /// Moves due delayed messages back onto the main queue.
    ///
    /// Returns how many became visible. Called before every dequeue poll
    /// and by the janitor, so backoff expiry is bounded by whichever runs
    /// first.
    pub async fn promote_due(&self) -> Result<u64, TransportError> {
        let due = self
            .store
            .take_due(&self.keys.delayed(), Timestamp::now())
            .await?;
        let mut promoted = 0u64;
        for raw in due {
            if let Err(e) = self.store.push_back(&self.keys.queue(), raw.clone()).await {
                // Best effort: put the message back under a zero delay so a
                // later pass can promote it. A production store fuses
                // take-and-push into one script and never lands here.
                warn!(error = %e, "Promotion push failed; re-delaying message");
                let _ = self
                    .store
                    .add_delayed(&self.keys.delayed(), raw, Timestamp::now())
                    .await;
                return Err(e.into());
            }
            promoted += 1;
        }
        Ok(promoted)
    }

    /// Blocks up to `timeout` for a message, atomically moving it to the
    /// in-flight list and creating its processing lease.
    ///
    /// Returns `Ok(None)` on timeout - an idle poll, not an error.
    pub async fn dequeue(&self, timeout: Duration) -> Result<Option<LeasedMessage>, TransportError> {
        self.promote_due().await?;

        let Some(raw) = self
            .store
            .blocking_pop_move(&self.keys.queue(), &self.keys.inflight(), timeout)
            .await?
        else {
            return Ok(None);
        };

        let message: QueueMessage = match decode(&raw) {
            Ok(message) => message,
            Err(e) => {
                // Undecodable entries cannot be leased or retried; drop
                // them from the in-flight list so they do not wedge the
                // janitor, and leave a loud log line behind.
                error!(error = %e, "Dropping undecodable queue entry");
                self.store
                    .remove_value(&self.keys.inflight(), &raw)
                    .await?;
                return Ok(None);
            }
        };

        let lease = ProcessingLease::acquire(
            message.message_id.clone(),
            self.worker_id.clone(),
            self.config.lease_ttl,
        );
        let lease_raw = encode(&lease)?;
        self.store
            .put(
                &self.keys.lease(message.message_id.as_str()),
                lease_raw.clone(),
                None,
            )
            .await?;

        debug!(
            message_id = %message.message_id,
            worker = %self.worker_id,
            attempt = message.attempt_count,
            "Message dequeued under lease"
        );

        Ok(Some(LeasedMessage {
            message,
            lease,
            raw,
            lease_raw,
        }))
    }

    /// Extends the lease's heartbeat deadline.
    ///
    /// A rejected heartbeat means the janitor already reclaimed the
    /// message; the caller must abandon it without acking or nacking.
    pub async fn heartbeat(&self, leased: &mut LeasedMessage) -> Result<(), TransportError> {
        let renewed = leased.lease.renewed(self.config.lease_ttl);
        let new_raw = encode(&renewed)?;
        let key = self.keys.lease(leased.message.message_id.as_str());
        let swapped = self
            .store
            .compare_and_swap(&key, Some(&leased.lease_raw), new_raw.clone(), None)
            .await?;
        if !swapped {
            warn!(
                message_id = %leased.message.message_id,
                worker = %self.worker_id,
                "Heartbeat rejected; lease was reclaimed"
            );
            return Err(TransportError::LeaseLost {
                message_id: leased.message.message_id.to_string(),
            });
        }
        leased.lease = renewed;
        leased.lease_raw = new_raw;
        Ok(())
    }

    /// Permanently removes the message and its lease.
    ///
    /// Idempotent: acking after the janitor reclaimed the lease is a
    /// no-op success.
    pub async fn ack(&self, leased: &LeasedMessage) -> Result<(), TransportError> {
        let removed = self
            .store
            .remove_value(&self.keys.inflight(), &leased.raw)
            .await?;
        let key = self.keys.lease(leased.message.message_id.as_str());
        self.store
            .compare_and_delete(&key, &leased.lease_raw)
            .await?;

        if removed == 0 {
            debug!(
                message_id = %leased.message.message_id,
                "Ack for already-reclaimed message; no-op"
            );
        } else {
            MuttMetrics::message_acked();
            debug!(message_id = %leased.message.message_id, "Message acked");
        }
        Ok(())
    }

    /// Records a failed attempt and either re-queues the message with
    /// backoff or dead-letters it once the attempt budget is exhausted.
    ///
    /// The destination write precedes the in-flight removal, so a crash
    /// between the two duplicates the message instead of losing it.
    pub async fn nack(
        &self,
        leased: LeasedMessage,
        error: &str,
    ) -> Result<NackOutcome, TransportError> {
        if !self.claim_lease(&leased).await? {
            return Ok(NackOutcome::Abandoned);
        }

        let mut message = leased.message.clone();
        message.record_failure(error);

        let outcome = if message.attempt_count < self.config.max_attempts {
            let delay = self.backoff.delay_for_attempt(message.attempt_count);
            self.store
                .add_delayed(
                    &self.keys.delayed(),
                    encode(&message)?,
                    Timestamp::now().plus(delay),
                )
                .await?;
            MuttMetrics::message_nacked();
            warn!(
                message_id = %message.message_id,
                attempt = message.attempt_count,
                delay_ms = delay.as_millis() as u64,
                error = error,
                "Message nacked; re-queued with backoff"
            );
            NackOutcome::Requeued {
                attempt: message.attempt_count,
                delay,
            }
        } else {
            self.push_dead_letter(message, error).await?;
            NackOutcome::DeadLettered
        };

        self.drop_inflight(&leased).await?;
        Ok(outcome)
    }

    /// Re-queues the message with a short fixed delay without consuming a
    /// delivery attempt (breaker-blocked / rate-limited sends).
    ///
    /// Returns false when the lease was already reclaimed.
    pub async fn defer(
        &self,
        leased: LeasedMessage,
        reason: DeferReason,
    ) -> Result<bool, TransportError> {
        if !self.claim_lease(&leased).await? {
            return Ok(false);
        }

        self.store
            .add_delayed(
                &self.keys.delayed(),
                leased.raw.clone(),
                Timestamp::now().plus(self.config.defer_delay),
            )
            .await?;
        self.drop_inflight(&leased).await?;
        MuttMetrics::message_deferred(reason.as_str());
        debug!(
            message_id = %leased.message.message_id,
            reason = reason.as_str(),
            "Message deferred without consuming an attempt"
        );
        Ok(true)
    }

    /// Immediately dead-letters the message (permanent failures).
    ///
    /// Returns false when the lease was already reclaimed.
    pub async fn dead_letter(
        &self,
        leased: LeasedMessage,
        reason: &str,
    ) -> Result<bool, TransportError> {
        if !self.claim_lease(&leased).await? {
            return Ok(false);
        }
        let mut message = leased.message.clone();
        message.record_failure(reason);
        self.push_dead_letter(message, reason).await?;
        self.drop_inflight(&leased).await?;
        Ok(true)
    }

    /// Current main queue depth.
    pub async fn queue_depth(&self) -> Result<u64, TransportError> {
        Ok(self.store.list_len(&self.keys.queue()).await?)
    }

    /// Current in-flight count.
    pub async fn inflight_count(&self) -> Result<u64, TransportError> {
        Ok(self.store.list_len(&self.keys.inflight()).await?)
    }

    /// Current number of delayed (not yet visible) messages.
    pub async fn delayed_count(&self) -> Result<u64, TransportError> {
        Ok(self.store.delayed_len(&self.keys.delayed()).await?)
    }

    /// Current dead letter queue length.
    pub async fn dlq_len(&self) -> Result<u64, TransportError> {
        Ok(self.store.list_len(&self.keys.dead_letters()).await?)
    }

    /// Returns every dead letter record for inspection.
    ///
    /// Entries that fail to decode are skipped with a warning rather than
    /// failing the whole listing.
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetterRecord>, TransportError> {
        let raw_entries = self.store.list_range(&self.keys.dead_letters()).await?;
        let mut records = Vec::with_capacity(raw_entries.len());
        for raw in raw_entries {
            match decode::<DeadLetterRecord>(&raw) {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "Skipping undecodable dead letter entry"),
            }
        }
        Ok(records)
    }

    /// Claims the message's next transition by deleting the lease.
    ///
    /// The compare-and-delete is the single-winner step against the
    /// janitor: whoever deletes the observed lease value owns what happens
    /// to the message next. Returns false when this worker lost.
    async fn claim_lease(&self, leased: &LeasedMessage) -> Result<bool, TransportError> {
        let key = self.keys.lease(leased.message.message_id.as_str());
        let owned = self
            .store
            .compare_and_delete(&key, &leased.lease_raw)
            .await?;
        if !owned {
            debug!(
                message_id = %leased.message.message_id,
                "Lease already reclaimed; abandoning transition"
            );
        }
        Ok(owned)
    }

    /// Removes this exact in-flight entry after its replacement was
    /// written.
    async fn drop_inflight(&self, leased: &LeasedMessage) -> Result<(), TransportError> {
        let removed = self
            .store
            .remove_value(&self.keys.inflight(), &leased.raw)
            .await?;
        if removed == 0 {
            warn!(
                message_id = %leased.message.message_id,
                "In-flight entry already removed"
            );
        }
        Ok(())
    }

    async fn push_dead_letter(
        &self,
        message: QueueMessage,
        reason: &str,
    ) -> Result<(), TransportError> {
        let record = DeadLetterRecord::new(message, reason);
        self.store
            .push_back(&self.keys.dead_letters(), encode(&record)?)
            .await?;
        MuttMetrics::message_dead_lettered();
        error!(
            message_id = %record.message.message_id,
            attempts = record.message.attempt_count,
            reason = reason,
            "Message dead-lettered"
        );
        Ok(())
    }
}
