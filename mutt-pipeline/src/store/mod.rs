//! Shared coordination store interface.
//!
//! All cross-replica state transitions go through this trait's atomic
//! primitives: atomic list-to-list moves, conditional set-with-TTL,
//! increment-with-expiry, and delayed-visibility sets. A replica never
//! reads-then-writes shared state in two steps against this interface;
//! each method is one atomic operation on the store.
//!
//! Any store offering these primitives is substitutable (Redis being the
//! obvious production choice - each method maps onto a command or a small
//! script). [`MemoryStore`] is the complete in-process implementation used
//! by tests and single-node deployments.

use std::time::Duration;

use async_trait::async_trait;

use mutt_core::error::StoreError;
use mutt_core::types::Timestamp;

mod memory;

pub use memory::MemoryStore;

/// Opaque value stored in lists, keys, and delayed sets.
pub type Bytes = Vec<u8>;

/// The atomic primitives the pipeline requires from its shared store.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Appends a value to the tail of a list, returning the new length.
    async fn push_back(&self, list: &str, value: Bytes) -> Result<u64, StoreError>;

    /// Atomically moves the head of `src` to the tail of `dst`, blocking
    /// up to `timeout` for a value to appear.
    ///
    /// Returns `None` on timeout. There is no instant at which the moved
    /// value is in neither list or in both.
    async fn blocking_pop_move(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<Bytes>, StoreError>;

    /// Atomically removes every occurrence of `value` from a list,
    /// returning how many were removed.
    ///
    /// The returned count is the single-winner guard for concurrent
    /// reclaimers: exactly one caller observes a non-zero count.
    async fn remove_value(&self, list: &str, value: &[u8]) -> Result<u64, StoreError>;

    /// Returns the length of a list.
    async fn list_len(&self, list: &str) -> Result<u64, StoreError>;

    /// Returns every value in a list, head first.
    async fn list_range(&self, list: &str) -> Result<Vec<Bytes>, StoreError>;

    /// Returns the value at a key, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Sets a key unconditionally, with an optional TTL.
    async fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Conditionally sets a key in one atomic step.
    ///
    /// With `expected: Some(v)` the write happens only if the current
    /// value equals `v`; with `expected: None` only if the key is absent.
    /// Returns whether the write happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Bytes,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Deletes a key only if it currently holds `expected`, returning
    /// whether the delete happened.
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError>;

    /// Deletes a key unconditionally, returning whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically increments a counter, starting its expiry window on the
    /// first increment. Returns the post-increment count.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;

    /// Adds a value to a delayed-visibility set, visible at `visible_at`.
    async fn add_delayed(
        &self,
        set: &str,
        value: Bytes,
        visible_at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Atomically removes and returns every value whose visibility time
    /// is at or before `now`, in visibility order.
    async fn take_due(&self, set: &str, now: Timestamp) -> Result<Vec<Bytes>, StoreError>;

    /// Returns the number of values in a delayed-visibility set.
    async fn delayed_len(&self, set: &str) -> Result<u64, StoreError>;

    /// Returns every key with the given prefix.
    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Checks connectivity.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Key layout for every pipeline structure in the store.
///
/// All keys share one configured prefix so multiple pipelines can share a
/// store without collisions.
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    /// Creates a key space under the given prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Main queue list.
    #[must_use]
    pub fn queue(&self) -> String {
        format!("{}:queue", self.prefix)
    }

    /// In-flight list.
    #[must_use]
    pub fn inflight(&self) -> String {
        format!("{}:inflight", self.prefix)
    }

    /// Delayed-visibility set for backoff and deferral requeues.
    #[must_use]
    pub fn delayed(&self) -> String {
        format!("{}:delayed", self.prefix)
    }

    /// Dead letter queue list.
    #[must_use]
    pub fn dead_letters(&self) -> String {
        format!("{}:dlq", self.prefix)
    }

    /// Lease key for a message.
    #[must_use]
    pub fn lease(&self, message_id: &str) -> String {
        format!("{}:lease:{message_id}", self.prefix)
    }

    /// Prefix shared by all lease keys.
    #[must_use]
    pub fn lease_prefix(&self) -> String {
        format!("{}:lease:", self.prefix)
    }

    /// Circuit breaker state for a destination.
    #[must_use]
    pub fn breaker(&self, destination: &str) -> String {
        format!("{}:breaker:{destination}", self.prefix)
    }

    /// Rate-limit window counter for a destination.
    #[must_use]
    pub fn rate_window(&self, destination: &str) -> String {
        format!("{}:rate:{destination}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyspace_layout() {
        let keys = KeySpace::new("mutt");
        assert_eq!(keys.queue(), "mutt:queue");
        assert_eq!(keys.inflight(), "mutt:inflight");
        assert_eq!(keys.delayed(), "mutt:delayed");
        assert_eq!(keys.dead_letters(), "mutt:dlq");
        assert_eq!(keys.lease("m-1"), "mutt:lease:m-1");
        assert_eq!(keys.breaker("moog"), "mutt:breaker:moog");
        assert_eq!(keys.rate_window("moog"), "mutt:rate:moog");
        assert!(keys.lease("m-1").starts_with(&keys.lease_prefix()));
    }
}
