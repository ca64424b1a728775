//! Store and publisher doubles shared by the unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

use super::store::{CounterStore, MemoryStore, StoreError};
use crate::sync::{Publisher, SyncError};

fn unavailable() -> StoreError {
    StoreError::Backend("store unavailable".to_string())
}

/// A store where every call fails.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl CounterStore for FailingStore {
    async fn increment_window(&self, _: &str, _: u64, _: Duration) -> Result<u64, StoreError> {
        Err(unavailable())
    }

    async fn set_expiry(&self, _: &str, _: Duration) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn delete(&self, _: &str) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn set_add(&self, _: &str, _: &str) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn set_remove(&self, _: &str, _: &str) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn set_members(&self, _: &str) -> Result<Vec<String>, StoreError> {
        Err(unavailable())
    }
}

/// A store whose increments never complete.
#[derive(Debug, Default)]
pub struct PendingStore {
    increments: AtomicUsize,
}

impl PendingStore {
    pub fn increments(&self) -> usize {
        self.increments.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CounterStore for PendingStore {
    async fn increment_window(&self, _: &str, _: u64, _: Duration) -> Result<u64, StoreError> {
        self.increments.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn set_expiry(&self, _: &str, _: Duration) -> Result<(), StoreError> {
        Ok(())
    }

    async fn delete(&self, _: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn set_add(&self, _: &str, _: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn set_remove(&self, _: &str, _: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn set_members(&self, _: &str) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }
}

/// A memory store that pauses its first `set_add`, after the write, until released.
#[derive(Debug)]
pub struct GatedStore {
    inner: MemoryStore,
    armed: AtomicBool,
    gated: Notify,
    released: Notify,
}

impl Default for GatedStore {
    fn default() -> Self {
        Self {
            inner: MemoryStore::new(),
            armed: AtomicBool::new(true),
            gated: Notify::new(),
            released: Notify::new(),
        }
    }
}

impl GatedStore {
    /// Wait until a `set_add` has written and is paused.
    pub async fn wait_until_gated(&self) {
        self.gated.notified().await;
    }

    /// Let the paused `set_add` return.
    pub fn release(&self) {
        self.released.notify_one();
    }
}

#[async_trait]
impl CounterStore for GatedStore {
    async fn increment_window(&self, key: &str, threshold: u64, window: Duration) -> Result<u64, StoreError> {
        self.inner.increment_window(key, threshold, window).await
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.inner.set_expiry(key, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.inner.set_add(key, member).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.gated.notify_one();
            self.released.notified().await;
        }
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.inner.set_remove(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.inner.set_members(key).await
    }
}

/// A publisher that remembers every message, optionally failing each publish.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, channel: &str, message: &str) -> Result<(), SyncError> {
        if self.fail {
            return Err(SyncError::Transport("channel closed".to_string()));
        }
        self.messages
            .lock()
            .push((channel.to_string(), message.to_string()));
        Ok(())
    }
}
