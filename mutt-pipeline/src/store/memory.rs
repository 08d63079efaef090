//! In-process coordination store.
//!
//! One mutex guards all state, which makes every trait method trivially
//! atomic. Blocking pops park on a shared [`Notify`] and re-check after
//! every wakeup, so spurious wakeups are harmless.
//!
//! The store can be flipped "offline" to exercise unavailability paths in
//! tests; while offline every operation returns
//! `StoreError::Unavailable`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use mutt_core::error::StoreError;
use mutt_core::types::Timestamp;

use super::{Bytes, CoordinationStore};

#[derive(Default)]
struct Inner {
    lists: HashMap<String, VecDeque<Bytes>>,
    keys: HashMap<String, KeyEntry>,
    counters: HashMap<String, CounterEntry>,
    delayed: HashMap<String, Vec<DelayedEntry>>,
}

struct KeyEntry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl KeyEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

struct CounterEntry {
    count: u64,
    expires_at: Instant,
}

struct DelayedEntry {
    visible_at: Timestamp,
    value: Bytes,
}

/// In-memory implementation of [`CoordinationStore`].
pub struct MemoryStore {
    inner: Mutex<Inner>,
    notify: Notify,
    offline: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulates the store becoming unreachable (or reachable again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
        if !offline {
            self.notify.notify_waiters();
        }
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "store offline".to_string(),
            });
        }
        Ok(())
    }

    fn live_value<'a>(inner: &'a Inner, key: &str, now: Instant) -> Option<&'a Bytes> {
        inner
            .keys
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| &entry.value)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn push_back(&self, list: &str, value: Bytes) -> Result<u64, StoreError> {
        self.check_online()?;
        let len = {
            let mut inner = self.inner.lock();
            let entries = inner.lists.entry(list.to_string()).or_default();
            entries.push_back(value);
            entries.len() as u64
        };
        self.notify.notify_waiters();
        Ok(len)
    }

    async fn blocking_pop_move(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<Bytes>, StoreError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            self.check_online()?;
            // Register for wakeups before checking, so a push between the
            // check and the await cannot be missed.
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock();
                let popped = inner
                    .lists
                    .get_mut(src)
                    .and_then(VecDeque::pop_front);
                if let Some(value) = popped {
                    inner
                        .lists
                        .entry(dst.to_string())
                        .or_default()
                        .push_back(value.clone());
                    return Ok(Some(value));
                }
            }
            tokio::select! {
                () = notified => {}
                () = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn remove_value(&self, list: &str, value: &[u8]) -> Result<u64, StoreError> {
        self.check_online()?;
        let mut inner = self.inner.lock();
        let Some(entries) = inner.lists.get_mut(list) else {
            return Ok(0);
        };
        let before = entries.len();
        entries.retain(|entry| entry != value);
        Ok((before - entries.len()) as u64)
    }

    async fn list_len(&self, list: &str) -> Result<u64, StoreError> {
        self.check_online()?;
        let inner = self.inner.lock();
        Ok(inner.lists.get(list).map_or(0, |l| l.len() as u64))
    }

    async fn list_range(&self, list: &str) -> Result<Vec<Bytes>, StoreError> {
        self.check_online()?;
        let inner = self.inner.lock();
        Ok(inner
            .lists
            .get(list)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.check_online()?;
        let inner = self.inner.lock();
        Ok(Self::live_value(&inner, key, Instant::now()).cloned())
    }

    async fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.check_online()?;
        let mut inner = self.inner.lock();
        inner.keys.insert(
            key.to_string(),
            KeyEntry {
                value,
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Bytes,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.check_online()?;
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let current = Self::live_value(&inner, key, now);
        let matches = match (current, expected) {
            (None, None) => true,
            (Some(value), Some(expected)) => value.as_slice() == expected,
            _ => false,
        };
        if !matches {
            return Ok(false);
        }
        inner.keys.insert(
            key.to_string(),
            KeyEntry {
                value: new,
                expires_at: ttl.map(|t| now + t),
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        self.check_online()?;
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let matches = Self::live_value(&inner, key, now)
            .is_some_and(|value| value.as_slice() == expected);
        if matches {
            inner.keys.remove(key);
        }
        Ok(matches)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check_online()?;
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let existed = Self::live_value(&inner, key, now).is_some();
        inner.keys.remove(key);
        Ok(existed)
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        self.check_online()?;
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let counter = inner
            .counters
            .entry(key.to_string())
            .and_modify(|entry| {
                if entry.expires_at <= now {
                    entry.count = 0;
                    entry.expires_at = now + ttl;
                }
            })
            .or_insert_with(|| CounterEntry {
                count: 0,
                expires_at: now + ttl,
            });
        counter.count += 1;
        Ok(counter.count)
    }

    async fn add_delayed(
        &self,
        set: &str,
        value: Bytes,
        visible_at: Timestamp,
    ) -> Result<(), StoreError> {
        self.check_online()?;
        let mut inner = self.inner.lock();
        inner
            .delayed
            .entry(set.to_string())
            .or_default()
            .push(DelayedEntry { visible_at, value });
        Ok(())
    }

    async fn take_due(&self, set: &str, now: Timestamp) -> Result<Vec<Bytes>, StoreError> {
        self.check_online()?;
        let mut inner = self.inner.lock();
        let Some(entries) = inner.delayed.get_mut(set) else {
            return Ok(Vec::new());
        };
        let mut due: Vec<DelayedEntry> = Vec::new();
        let mut remaining: Vec<DelayedEntry> = Vec::new();
        for entry in entries.drain(..) {
            if entry.visible_at <= now {
                due.push(entry);
            } else {
                remaining.push(entry);
            }
        }
        *entries = remaining;
        due.sort_by_key(|entry| entry.visible_at);
        Ok(due.into_iter().map(|entry| entry.value).collect())
    }

    async fn delayed_len(&self, set: &str) -> Result<u64, StoreError> {
        self.check_online()?;
        let inner = self.inner.lock();
        Ok(inner.delayed.get(set).map_or(0, |s| s.len() as u64))
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.check_online()?;
        let now = Instant::now();
        let inner = self.inner.lock();
        Ok(inner
            .keys
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_online()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_push_and_pop_move() {
        let store = MemoryStore::new();
        store.push_back("q", b"a".to_vec()).await.unwrap();
        store.push_back("q", b"b".to_vec()).await.unwrap();

        let moved = store
            .blocking_pop_move("q", "inflight", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(moved, Some(b"a".to_vec()));
        assert_eq!(store.list_len("q").await.unwrap(), 1);
        assert_eq!(store.list_len("inflight").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pop_move_times_out_empty() {
        let store = MemoryStore::new();
        let start = tokio::time::Instant::now();
        let moved = store
            .blocking_pop_move("q", "inflight", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(moved, None);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_pop_move_wakes_on_push() {
        let store = Arc::new(MemoryStore::new());
        let popper = Arc::clone(&store);
        let handle = tokio::spawn(async move {
            popper
                .blocking_pop_move("q", "inflight", Duration::from_secs(5))
                .await
                .unwrap()
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.push_back("q", b"x".to_vec()).await.unwrap();

        let moved = handle.await.unwrap();
        assert_eq!(moved, Some(b"x".to_vec()));
    }

    #[tokio::test]
    async fn test_remove_value_counts() {
        let store = MemoryStore::new();
        store.push_back("l", b"v".to_vec()).await.unwrap();
        assert_eq!(store.remove_value("l", b"v").await.unwrap(), 1);
        assert_eq!(store.remove_value("l", b"v").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_compare_and_swap_absent() {
        let store = MemoryStore::new();
        assert!(store
            .compare_and_swap("k", None, b"1".to_vec(), None)
            .await
            .unwrap());
        // A second set-if-absent must lose.
        assert!(!store
            .compare_and_swap("k", None, b"2".to_vec(), None)
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn test_compare_and_swap_value() {
        let store = MemoryStore::new();
        store.put("k", b"1".to_vec(), None).await.unwrap();
        assert!(!store
            .compare_and_swap("k", Some(b"0"), b"2".to_vec(), None)
            .await
            .unwrap());
        assert!(store
            .compare_and_swap("k", Some(b"1"), b"2".to_vec(), None)
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_compare_and_delete() {
        let store = MemoryStore::new();
        store.put("k", b"1".to_vec(), None).await.unwrap();
        assert!(!store.compare_and_delete("k", b"0").await.unwrap());
        assert!(store.compare_and_delete("k", b"1").await.unwrap());
        assert!(!store.compare_and_delete("k", b"1").await.unwrap());
    }

    #[tokio::test]
    async fn test_key_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .put("k", b"1".to_vec(), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(store.get("k").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_incr_with_expiry_resets_after_window() {
        let store = MemoryStore::new();
        let window = Duration::from_millis(40);
        assert_eq!(store.incr_with_expiry("c", window).await.unwrap(), 1);
        assert_eq!(store.incr_with_expiry("c", window).await.unwrap(), 2);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.incr_with_expiry("c", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delayed_visibility() {
        let store = MemoryStore::new();
        let now = Timestamp::now();
        store
            .add_delayed("d", b"soon".to_vec(), now.plus(Duration::from_millis(10)))
            .await
            .unwrap();
        store
            .add_delayed("d", b"later".to_vec(), now.plus(Duration::from_secs(60)))
            .await
            .unwrap();

        let due = store
            .take_due("d", now.plus(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(due, vec![b"soon".to_vec()]);
        assert_eq!(store.delayed_len("d").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scan_prefix() {
        let store = MemoryStore::new();
        store.put("mutt:lease:a", b"1".to_vec(), None).await.unwrap();
        store.put("mutt:lease:b", b"1".to_vec(), None).await.unwrap();
        store.put("other", b"1".to_vec(), None).await.unwrap();

        let mut keys = store.scan("mutt:lease:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["mutt:lease:a", "mutt:lease:b"]);
    }

    #[tokio::test]
    async fn test_offline_surfaces_unavailable() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let err = store.push_back("q", b"x".to_vec()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
        assert!(store.ping().await.is_err());

        store.set_offline(false);
        assert!(store.ping().await.is_ok());
    }
}
