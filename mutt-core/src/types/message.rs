//! Queue message, lease, and dead-letter records.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CorrelationId, Event, MessageId, Timestamp, WorkerId};

/// One recorded delivery attempt of a queue message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Attempt number (1 for the first failed attempt).
    pub attempt: u32,
    /// Error that failed the attempt.
    pub error: String,
    /// When the attempt failed.
    pub failed_at: Timestamp,
}

/// A normalized event wrapped with pipeline delivery metadata.
///
/// Created on enqueue, destroyed on ack or dead-letter transfer.
/// `attempt_count` only ever increases; the attempt history carries one
/// record per failed attempt for dead-letter inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Queue-assigned message identifier.
    pub message_id: MessageId,
    /// The wrapped event.
    pub event: Event,
    /// Number of failed delivery attempts so far.
    #[serde(default)]
    pub attempt_count: u32,
    /// When the message entered the queue.
    pub enqueued_at: Timestamp,
    /// Correlation id threading the event through logs and alerts.
    pub correlation_id: CorrelationId,
    /// Most recent delivery error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Full per-attempt failure history.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<AttemptRecord>,
}

impl QueueMessage {
    /// Wraps an event into a fresh queue message.
    #[must_use]
    pub fn wrap(event: Event) -> Self {
        Self {
            message_id: MessageId::generate(),
            event,
            attempt_count: 0,
            enqueued_at: Timestamp::now(),
            correlation_id: CorrelationId::generate(),
            last_error: None,
            attempts: Vec::new(),
        }
    }

    /// Records a failed attempt, incrementing the attempt count.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.attempt_count += 1;
        self.attempts.push(AttemptRecord {
            attempt: self.attempt_count,
            error: error.clone(),
            failed_at: Timestamp::now(),
        });
        self.last_error = Some(error);
    }

}

/// Time-bounded exclusive claim on a queue message by one worker.
///
/// Created atomically with dequeue; renewed by heartbeats; destroyed on
/// ack, nack, or janitor reclamation. At most one live lease exists per
/// message at any instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingLease {
    /// The leased message.
    pub message_id: MessageId,
    /// Worker holding the lease.
    pub owner: WorkerId,
    /// When the lease was acquired.
    pub acquired_at: Timestamp,
    /// Deadline after which the janitor may reclaim the message.
    pub heartbeat_expires_at: Timestamp,
}

impl ProcessingLease {
    /// Creates a lease for the given message expiring `ttl` from now.
    #[must_use]
    pub fn acquire(message_id: MessageId, owner: WorkerId, ttl: Duration) -> Self {
        let now = Timestamp::now();
        Self {
            message_id,
            owner,
            acquired_at: now,
            heartbeat_expires_at: now.plus(ttl),
        }
    }

    /// Returns a copy with the heartbeat deadline extended to `ttl` from now.
    #[must_use]
    pub fn renewed(&self, ttl: Duration) -> Self {
        Self {
            heartbeat_expires_at: Timestamp::now().plus(ttl),
            ..self.clone()
        }
    }

    /// Returns true if the heartbeat deadline has passed.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.heartbeat_expires_at.is_before(now)
    }
}

/// Terminal record for a message that exhausted its delivery budget.
///
/// Never re-enters the live pipeline automatically; operator tooling may
/// inspect and replay it through a fresh enqueue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    /// The message, including its full attempt history.
    pub message: QueueMessage,
    /// Final failure reason.
    pub reason: String,
    /// When the message was dead-lettered.
    pub dead_lettered_at: Timestamp,
}

impl DeadLetterRecord {
    /// Creates a dead-letter record for the given message.
    #[must_use]
    pub fn new(message: QueueMessage, reason: impl Into<String>) -> Self {
        Self {
            message,
            reason: reason.into(),
            dead_lettered_at: Timestamp::now(),
        }
    }
}
