//! Whitelist and blacklist management.
//!
//! Each list lives twice: authoritatively as a set in the counter store, and as
//! a local cache consulted on every check without a store round trip. Local
//! caches on other instances catch up through sync messages.

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Result, TurnstileError};
use crate::sync::SyncAction;

use super::limiter::RateLimiter;
use super::store::CounterStore;

/// Which override list an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    /// Always allowed
    White,
    /// Always denied
    Black,
}

impl ListKind {
    /// Suffix of the store key holding this list.
    pub fn suffix(&self) -> &'static str {
        match self {
            ListKind::White => "white",
            ListKind::Black => "black",
        }
    }

    fn add_action(&self) -> SyncAction {
        match self {
            ListKind::White => SyncAction::AddWhiteList,
            ListKind::Black => SyncAction::AddBlackList,
        }
    }

    fn remove_action(&self) -> SyncAction {
        match self {
            ListKind::White => SyncAction::RemoveWhiteList,
            ListKind::Black => SyncAction::RemoveBlackList,
        }
    }

    fn exists_error(&self) -> TurnstileError {
        match self {
            ListKind::White => TurnstileError::WhiteListExists,
            ListKind::Black => TurnstileError::BlackListExists,
        }
    }
}

impl std::fmt::Display for ListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}list", self.suffix())
    }
}

/// The local, ordered cache of one override list.
///
/// Reads take a shared lock, mutations an exclusive one. The entry lock is
/// never held across a store call; administrative mutations are serialized
/// by a separate async guard held across both the store write and the cache
/// update, so the cache never keeps an id the store no longer has.
#[derive(Debug)]
pub struct AccessList {
    kind: ListKind,
    key: String,
    entries: RwLock<Vec<String>>,
    mutation: Mutex<()>,
}

impl AccessList {
    /// Create an empty list persisted under `<limiter>-<suffix>`.
    pub fn new(limiter: &str, kind: ListKind) -> Self {
        Self {
            kind,
            key: format!("{}-{}", limiter, kind.suffix()),
            entries: RwLock::new(Vec::new()),
            mutation: Mutex::new(()),
        }
    }

    /// Store key of the persisted set.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Exact, case-sensitive membership test.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().iter().any(|entry| entry == id)
    }

    /// Snapshot of the cached entries in insertion order.
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.read().clone()
    }

    /// Number of cached entries.
    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Append `id`, returning `false` if it was already cached.
    pub(crate) fn insert(&self, id: &str) -> bool {
        let mut entries = self.entries.write();
        if entries.iter().any(|entry| entry == id) {
            return false;
        }
        entries.push(id.to_string());
        true
    }

    /// Remove `id`, returning `false` if it was not cached.
    pub(crate) fn remove(&self, id: &str) -> bool {
        let mut entries = self.entries.write();
        match entries.iter().position(|entry| entry == id) {
            Some(idx) => {
                entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Merge `ids` into the cache, skipping ones already present.
    pub(crate) fn extend<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = self.entries.write();
        for id in ids {
            let id = id.as_ref();
            if !entries.iter().any(|entry| entry == id) {
                entries.push(id.to_string());
            }
        }
    }

    /// Seed the cache from static configuration plus the persisted set.
    ///
    /// A failed store read leaves only the static entries.
    pub(crate) async fn seed(&self, configured: &[String], store: &dyn CounterStore) {
        self.extend(configured);
        match store.set_members(&self.key).await {
            Ok(members) => self.extend(members),
            Err(e) => warn!(
                key = %self.key,
                error = %e,
                "Failed to load persisted {}, continuing with configured entries",
                self.kind
            ),
        }
        debug!(key = %self.key, entries = self.len(), "Seeded {}", self.kind);
    }
}

impl RateLimiter {
    /// Add `id` to the whitelist.
    pub async fn add_white_list(&self, id: &str, publish: bool) -> Result<()> {
        self.add_to(ListKind::White, id, publish).await
    }

    /// Add `id` to the blacklist.
    pub async fn add_black_list(&self, id: &str, publish: bool) -> Result<()> {
        self.add_to(ListKind::Black, id, publish).await
    }

    /// Remove `id` from the whitelist. Removing an absent id is not an error.
    pub async fn remove_white_list(&self, id: &str, publish: bool) -> Result<()> {
        self.remove_from(ListKind::White, id, publish).await
    }

    /// Remove `id` from the blacklist and reset its window counter.
    pub async fn remove_black_list(&self, id: &str, publish: bool) -> Result<()> {
        self.remove_from(ListKind::Black, id, publish).await?;
        self.check_reset(id).await
    }

    /// Snapshot of the local whitelist.
    pub fn white_list(&self) -> Vec<String> {
        self.list(ListKind::White).snapshot()
    }

    /// Snapshot of the local blacklist.
    pub fn black_list(&self) -> Vec<String> {
        self.list(ListKind::Black).snapshot()
    }

    /// Whether `id` is in the local whitelist.
    pub fn is_white_listed(&self, id: &str) -> bool {
        self.list(ListKind::White).contains(id)
    }

    /// Whether `id` is in the local blacklist.
    pub fn is_black_listed(&self, id: &str) -> bool {
        self.list(ListKind::Black).contains(id)
    }

    // The store write happens before the local duplicate check, so
    // `*ListExists` reports the local cache only; the set add has already
    // been applied.
    async fn add_to(&self, kind: ListKind, id: &str, publish: bool) -> Result<()> {
        let list = self.list(kind);
        {
            let _guard = list.mutation.lock().await;
            self.store().set_add(list.key(), id).await?;

            if !list.insert(id) {
                return Err(kind.exists_error());
            }
        }
        debug!(limiter = %self.name(), id = %id, publish, "Added to {}", kind);

        if publish {
            self.publish(kind.add_action(), id).await;
        }
        Ok(())
    }

    async fn remove_from(&self, kind: ListKind, id: &str, publish: bool) -> Result<()> {
        let list = self.list(kind);
        let removed = {
            let _guard = list.mutation.lock().await;
            self.store().set_remove(list.key(), id).await?;
            list.remove(id)
        };

        if removed {
            debug!(limiter = %self.name(), id = %id, publish, "Removed from {}", kind);
        }

        if publish {
            self.publish(kind.remove_action(), id).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimiterConfig;
    use crate::ratelimit::test_support::{FailingStore, GatedStore, RecordingPublisher};
    use crate::ratelimit::{Decision, MemoryStore};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn test_config() -> LimiterConfig {
        LimiterConfig::new("api", Duration::from_secs(10)).block_at(3, Duration::from_secs(30))
    }

    #[test]
    fn test_access_list_keys() {
        assert_eq!(AccessList::new("api", ListKind::White).key(), "api-white");
        assert_eq!(AccessList::new("api", ListKind::Black).key(), "api-black");
    }

    #[test]
    fn test_access_list_insert_remove() {
        let list = AccessList::new("api", ListKind::White);

        assert!(list.insert("alice"));
        assert!(!list.insert("alice"));
        assert!(list.insert("bob"));
        assert_eq!(list.snapshot(), vec!["alice", "bob"]);

        assert!(list.remove("alice"));
        assert!(!list.remove("alice"));
        assert_eq!(list.snapshot(), vec!["bob"]);
    }

    #[test]
    fn test_access_list_is_case_sensitive() {
        let list = AccessList::new("api", ListKind::Black);
        list.insert("Alice");
        assert!(list.contains("Alice"));
        assert!(!list.contains("alice"));
    }

    #[tokio::test]
    async fn test_seed_merges_configured_and_persisted() {
        let store = Arc::new(MemoryStore::new());
        store.set_add("api-white", "carol").await.unwrap();
        store.set_add("api-white", "alice").await.unwrap();

        let mut config = test_config();
        config.white_list = vec!["alice".to_string(), "bob".to_string(), "alice".to_string()];
        let limiter = RateLimiter::new(config, store).await.unwrap();

        assert_eq!(limiter.white_list(), vec!["alice", "bob", "carol"]);
        assert!(limiter.black_list().is_empty());
    }

    #[tokio::test]
    async fn test_seed_survives_store_failure() {
        let mut config = test_config();
        config.black_list = vec!["mallory".to_string()];

        let limiter = RateLimiter::new(config, Arc::new(FailingStore)).await.unwrap();

        assert_eq!(limiter.black_list(), vec!["mallory"]);
    }

    #[tokio::test]
    async fn test_add_white_list_twice() {
        let store = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::new(test_config(), store.clone()).await.unwrap();

        assert_ok!(limiter.add_white_list("alice", false).await);
        let err = assert_err!(limiter.add_white_list("alice", false).await);

        assert!(matches!(err, TurnstileError::WhiteListExists));
        assert_eq!(limiter.white_list(), vec!["alice"]);
        assert_eq!(store.set_members("api-white").await.unwrap(), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_add_persists_before_duplicate_check() {
        let store = Arc::new(MemoryStore::new());
        let mut config = test_config();
        config.black_list = vec!["mallory".to_string()];
        let limiter = RateLimiter::new(config, store.clone()).await.unwrap();

        let err = assert_err!(limiter.add_black_list("mallory", false).await);

        assert!(matches!(err, TurnstileError::BlackListExists));
        assert_eq!(store.set_members("api-black").await.unwrap(), vec!["mallory"]);
    }

    #[tokio::test]
    async fn test_add_publishes_only_when_requested() {
        let publisher = Arc::new(RecordingPublisher::default());
        let limiter = RateLimiter::with_publisher(
            test_config(),
            Arc::new(MemoryStore::new()),
            publisher.clone(),
        )
        .await
        .unwrap();

        limiter.add_white_list("alice", true).await.unwrap();
        limiter.add_black_list("bob", false).await.unwrap();
        limiter.remove_white_list("alice", true).await.unwrap();
        limiter.remove_black_list("bob", true).await.unwrap();

        assert_eq!(
            publisher.messages(),
            vec![
                ("api".to_string(), "addWhiteList-alice".to_string()),
                ("api".to_string(), "removeWhiteList-alice".to_string()),
                ("api".to_string(), "removeBlackList-bob".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_add_does_not_publish() {
        let publisher = Arc::new(RecordingPublisher::default());
        let limiter = RateLimiter::with_publisher(
            test_config(),
            Arc::new(MemoryStore::new()),
            publisher.clone(),
        )
        .await
        .unwrap();

        limiter.add_black_list("bob", true).await.unwrap();
        assert_err!(limiter.add_black_list("bob", true).await);

        assert_eq!(publisher.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let publisher = Arc::new(RecordingPublisher::failing());
        let store = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::with_publisher(test_config(), store.clone(), publisher)
            .await
            .unwrap();

        assert_ok!(limiter.add_black_list("bob", true).await);
        assert!(limiter.is_black_listed("bob"));
        assert_eq!(store.set_members("api-black").await.unwrap(), vec!["bob"]);
    }

    #[tokio::test]
    async fn test_remove_absent_is_idempotent() {
        let limiter = RateLimiter::new(test_config(), Arc::new(MemoryStore::new()))
            .await
            .unwrap();

        assert_ok!(limiter.remove_white_list("nobody", false).await);
        assert_ok!(limiter.remove_black_list("nobody", false).await);
    }

    #[tokio::test]
    async fn test_store_failure_fails_mutation() {
        let limiter = RateLimiter::new(test_config(), Arc::new(FailingStore))
            .await
            .unwrap();

        let err = assert_err!(limiter.add_white_list("alice", true).await);

        assert!(matches!(err, TurnstileError::Store(_)));
        assert!(!limiter.is_white_listed("alice"));
    }

    #[tokio::test]
    async fn test_remove_black_list_resets_counter() {
        let store = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::new(test_config(), store.clone()).await.unwrap();

        for _ in 0..3 {
            limiter.check("eve").await.unwrap();
        }
        limiter.add_black_list("eve", false).await.unwrap();
        limiter.remove_black_list("eve", false).await.unwrap();

        assert_eq!(store.count("api:eve"), None);
        let verdict = limiter.check("eve").await.unwrap();
        assert_eq!(verdict.count, 1);
        assert_eq!(verdict.decision, Decision::Allowed);
    }

    #[tokio::test]
    async fn test_concurrent_adds_keep_single_entry() {
        let limiter = Arc::new(
            RateLimiter::new(test_config(), Arc::new(MemoryStore::new()))
                .await
                .unwrap(),
        );

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.add_white_list("alice", false).await.is_ok() })
            })
            .collect();

        let mut added = 0;
        for handle in handles {
            if handle.await.unwrap() {
                added += 1;
            }
        }

        assert_eq!(added, 1);
        assert_eq!(limiter.white_list(), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_remove_during_pending_add_keeps_cache_consistent() {
        let store = Arc::new(GatedStore::default());
        let limiter = Arc::new(RateLimiter::new(test_config(), store.clone()).await.unwrap());

        let add = tokio::spawn({
            let limiter = limiter.clone();
            async move { limiter.add_black_list("x", false).await }
        });
        store.wait_until_gated().await;

        let remove = tokio::spawn({
            let limiter = limiter.clone();
            async move { limiter.remove_black_list("x", false).await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        store.release();

        assert_ok!(add.await.unwrap());
        assert_ok!(remove.await.unwrap());

        let persisted = store.set_members("api-black").await.unwrap();
        assert_eq!(limiter.black_list(), persisted);
        assert!(persisted.is_empty());
    }
}
