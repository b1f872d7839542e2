//! Process-local counter store with Redis semantics.
//!
//! Counters are only shared by tasks of this process, so limits multiply with
//! the number of instances. Used when `RATE_STORE_URL` is unset and in tests.
//!
//! Expiry is lazy: an expired key reads as absent and is dropped the next
//! time it is touched. Keys that are never touched again are reclaimed by a
//! sweep inside `incr`. Once the map holds [`SWEEP_MIN_LEN`] keys, a sweep
//! runs when the map has doubled since the last one or [`SWEEP_INTERVAL`] has
//! passed, so the map stays within twice the live key count. Deadlines use
//! `tokio::time::Instant`, so tests can drive expiry with a paused clock.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{RateStore, StoreResult};

/// Map size below which no sweep runs.
pub const SWEEP_MIN_LEN: usize = 1024;

/// Longest time between sweeps once the map is above [`SWEEP_MIN_LEN`].
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: i64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

#[derive(Debug)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Map size that triggers the next sweep
    sweep_at: usize,
    last_sweep: Instant,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            sweep_at: SWEEP_MIN_LEN,
            last_sweep: Instant::now(),
        }
    }
}

impl Inner {
    fn sweep_due(&self, now: Instant) -> bool {
        let len = self.entries.len();
        len >= SWEEP_MIN_LEN
            && (len >= self.sweep_at || now.saturating_duration_since(self.last_sweep) >= SWEEP_INTERVAL)
    }

    /// Drop every expired key. Returns how many were removed.
    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        self.sweep_at = self.entries.len().saturating_mul(2).max(SWEEP_MIN_LEN);
        self.last_sweep = now;
        before - self.entries.len()
    }
}

/// In-memory [`RateStore`].
#[derive(Debug, Default)]
pub struct MemoryRateStore {
    inner: Mutex<Inner>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time to live of `key`, `None` if the key is missing or has no expiry.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let inner = self.inner.lock().await;
        inner
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.expires_at)
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let inner = self.inner.lock().await;
        inner.entries.values().filter(|e| !e.is_expired(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every expired key now. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        self.inner.lock().await.purge_expired(now)
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;

        if inner.sweep_due(now) {
            let removed = inner.purge_expired(now);
            debug!(removed, remaining = inner.entries.len(), "Swept expired rate keys");
        }

        let entries = &mut inner.entries;
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }

        let entry = entries.entry(key.to_string()).or_insert(Entry {
            count: 0,
            expires_at: None,
        });
        entry.count = entry.count.saturating_add(1);
        Ok(entry.count)
    }

    async fn expire(&self, key: &str, seconds: u64) -> StoreResult<bool> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let entries = &mut inner.entries;

        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + Duration::from_secs(seconds));
                Ok(true)
            }
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_incr_creates_key_at_one() {
        let store = MemoryRateStore::new();
        assert_eq!(store.incr("k").await.unwrap(), 1);
        assert_eq!(store.incr("k").await.unwrap(), 2);
        assert_eq!(store.incr("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_incr_does_not_set_ttl() {
        let store = MemoryRateStore::new();
        store.incr("k").await.unwrap();
        assert!(store.ttl("k").await.is_none());
    }

    #[tokio::test]
    async fn test_expire_missing_key_returns_false() {
        let store = MemoryRateStore::new();
        assert!(!store.expire("missing", 60).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_expires_after_ttl() {
        let store = MemoryRateStore::new();
        store.incr("k").await.unwrap();
        store.incr("k").await.unwrap();
        assert!(store.expire("k", 60).await.unwrap());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(store.incr("k").await.unwrap(), 3);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.incr("k").await.unwrap(), 1);
        assert!(store.ttl("k").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_counts_down() {
        let store = MemoryRateStore::new();
        store.incr("k").await.unwrap();
        store.expire("k", 60).await.unwrap();

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(store.ttl("k").await, Some(Duration::from_secs(45)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_len_ignores_expired_keys() {
        let store = MemoryRateStore::new();
        store.incr("a").await.unwrap();
        store.incr("b").await.unwrap();
        store.expire("a", 1).await.unwrap();
        assert_eq!(store.len().await, 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.len().await, 1);
        assert!(!store.is_empty().await);
    }

    async fn held_in_map(store: &MemoryRateStore) -> usize {
        store.inner.lock().await.entries.len()
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_keys_never_touched_again_are_reclaimed() {
        let store = MemoryRateStore::new();
        for n in 0..10_000 {
            let key = format!("rate-limit:10.0.{}.{}", n / 256, n % 256);
            store.incr(&key).await.unwrap();
            store.expire(&key, 60).await.unwrap();
        }

        tokio::time::advance(Duration::from_secs(3600)).await;
        store.incr("rate-limit:192.0.2.1").await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(held_in_map(&store).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_map_stays_bounded_under_key_rotation() {
        let store = MemoryRateStore::new();
        for n in 0..20_000u32 {
            let key = format!("rate-limit:{n}");
            store.incr(&key).await.unwrap();
            store.expire(&key, 60).await.unwrap();
            // One new client per 10 ms: about 6000 live keys at any time
            tokio::time::advance(Duration::from_millis(10)).await;
        }

        // 20,000 keys were created; without sweeping all of them would remain
        assert!(held_in_map(&store).await <= 12_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_live_and_ttl_less_keys() {
        let store = MemoryRateStore::new();
        store.incr("no-ttl").await.unwrap();
        store.incr("live").await.unwrap();
        store.expire("live", 600).await.unwrap();
        store.incr("dead").await.unwrap();
        store.expire("dead", 1).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(held_in_map(&store).await, 2);
        assert_eq!(store.incr("no-ttl").await.unwrap(), 2);
        assert_eq!(store.incr("live").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_ping_and_backend() {
        let store = MemoryRateStore::new();
        assert!(store.ping().await.is_ok());
        assert_eq!(store.backend(), "memory");
    }
}
