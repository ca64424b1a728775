//! Counter store contract and an in-memory implementation.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Errors returned by a counter store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Generic backend failure
    #[error("Store error: {0}")]
    Backend(String),

    /// Redis failures
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// The shared store the limiter keeps its counters and lists in.
///
/// Every call is a single round trip. Implementations must make
/// `increment_window` atomic across all processes sharing the store.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter at `key` and return the new count.
    ///
    /// A missing key is created with a time-to-live of `window`. A non-zero
    /// `threshold` caps the stored count at that value.
    async fn increment_window(
        &self,
        key: &str,
        threshold: u64,
        window: Duration,
    ) -> Result<u64, StoreError>;

    /// Replace the time-to-live of `key`.
    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Delete `key`.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Add `member` to the set at `key`.
    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Remove `member` from the set at `key`.
    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// All members of the set at `key`.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;
}

/// Expired counters are swept roughly once per this many increments.
const EVICTION_INTERVAL: u64 = 100;

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    expires_at: Instant,
}

impl CounterEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// A store kept entirely in process memory.
///
/// Useful for single-instance deployments and tests. Expiry follows the tokio
/// clock, so a paused runtime controls it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    counters: DashMap<String, CounterEntry>,
    sets: DashMap<String, BTreeSet<String>>,
    ops_counter: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count for `key`, `None` if absent or expired.
    pub fn count(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        self.counters
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.count)
    }

    /// Number of counter entries held, expired or not.
    pub fn counter_entries(&self) -> usize {
        self.counters.len()
    }

    /// Drop expired counters every `EVICTION_INTERVAL` increments.
    ///
    /// Must run before taking an entry guard on `counters`.
    fn maybe_evict_expired(&self, now: Instant) {
        let ops = self.ops_counter.fetch_add(1, Ordering::Relaxed);
        if ops % EVICTION_INTERVAL != 0 {
            return;
        }
        self.counters.retain(|_, entry| !entry.is_expired(now));
    }

    /// Remaining time-to-live for `key`, `None` if absent or expired.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.counters
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at - now)
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment_window(
        &self,
        key: &str,
        threshold: u64,
        window: Duration,
    ) -> Result<u64, StoreError> {
        let now = Instant::now();
        self.maybe_evict_expired(now);

        let mut entry = self.counters.entry(key.to_string()).or_insert(CounterEntry {
            count: 0,
            expires_at: now + window,
        });

        if entry.is_expired(now) {
            *entry = CounterEntry {
                count: 0,
                expires_at: now + window,
            };
        }

        if threshold == 0 || entry.count < threshold {
            entry.count += 1;
        }
        Ok(entry.count)
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        if let Some(mut entry) = self.counters.get_mut(key) {
            if !entry.is_expired(now) {
                entry.expires_at = now + ttl;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.counters.remove(key);
        self.sets.remove(key);
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        if let Some(mut set) = self.sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}
