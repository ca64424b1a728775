//! Core rate limiter implementation.

use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::config::LimiterConfig;
use crate::error::{Result, TurnstileError};
use crate::sync::{Publisher, SyncAction, SyncMessage};

use super::access::{AccessList, ListKind};
use super::store::CounterStore;

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// The identity may proceed
    Allowed,
    /// The identity may proceed but crossed the warning threshold
    Warned,
    /// The identity is denied
    Blocked,
}

/// The count observed by a check together with the decision made on it.
///
/// Override decisions (whitelist, blacklist) report a count of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Window count after this request
    pub count: u64,
    /// Decision for this request
    pub decision: Decision,
}

impl Verdict {
    fn new(count: u64, decision: Decision) -> Self {
        Self { count, decision }
    }
}

/// A named, per-identity rate limiter.
///
/// Counters live in the shared store under `<name>:<id>`. The whitelist and
/// blacklist are cached locally and persisted under `<name>-white` and
/// `<name>-black`. This struct is thread-safe and can be shared across tasks.
pub struct RateLimiter {
    config: LimiterConfig,
    store: Arc<dyn CounterStore>,
    publisher: Option<Arc<dyn Publisher>>,
    white_list: AccessList,
    black_list: AccessList,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("white_list", &self.white_list)
            .field("black_list", &self.black_list)
            .field("publisher", &self.publisher.is_some())
            .finish()
    }
}

impl RateLimiter {
    /// Create a limiter that does not publish list changes.
    pub async fn new(config: LimiterConfig, store: Arc<dyn CounterStore>) -> Result<Self> {
        Self::build(config, store, None).await
    }

    /// Create a limiter that publishes list changes through `publisher`.
    pub async fn with_publisher(
        config: LimiterConfig,
        store: Arc<dyn CounterStore>,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self> {
        Self::build(config, store, Some(publisher)).await
    }

    async fn build(
        config: LimiterConfig,
        store: Arc<dyn CounterStore>,
        publisher: Option<Arc<dyn Publisher>>,
    ) -> Result<Self> {
        config.validate()?;

        let white_list = AccessList::new(&config.name, ListKind::White);
        let black_list = AccessList::new(&config.name, ListKind::Black);
        white_list.seed(&config.white_list, store.as_ref()).await;
        black_list.seed(&config.black_list, store.as_ref()).await;

        debug!(
            limiter = %config.name,
            window_ms = config.window_ms,
            warning_threshold = config.warning_threshold,
            block_threshold = config.block_threshold,
            block_duration_ms = config.block_duration_ms,
            "Rate limiter initialized"
        );

        Ok(Self {
            config,
            store,
            publisher,
            white_list,
            black_list,
        })
    }

    /// Limiter name, also the prefix of its keys and its sync channel.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The configuration this limiter was built with.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &dyn CounterStore {
        self.store.as_ref()
    }

    pub(crate) fn list(&self, kind: ListKind) -> &AccessList {
        match kind {
            ListKind::White => &self.white_list,
            ListKind::Black => &self.black_list,
        }
    }

    fn counter_key(&self, id: &str) -> String {
        format!("{}:{}", self.config.name, id)
    }

    /// Record a request from `id` and decide whether it may proceed.
    ///
    /// Whitelisted ids are allowed and blacklisted ids blocked without touching
    /// the store. Otherwise the window counter is incremented; crossing the
    /// block threshold either extends the counter's expiry to the block
    /// duration or, when the block duration is zero, blacklists the id.
    /// Store failures are returned unchanged.
    pub async fn check(&self, id: &str) -> Result<Verdict> {
        if self.white_list.contains(id) {
            trace!(limiter = %self.name(), id = %id, "Whitelisted");
            return Ok(Verdict::new(0, Decision::Allowed));
        }

        if self.black_list.contains(id) {
            trace!(limiter = %self.name(), id = %id, "Blacklisted");
            return Ok(Verdict::new(0, Decision::Blocked));
        }

        let key = self.counter_key(id);
        let count = self
            .store
            .increment_window(&key, 0, self.config.window())
            .await?;

        trace!(limiter = %self.name(), id = %id, count, "Checked window counter");

        let block_threshold = self.config.block_threshold;
        if block_threshold > 0 && count >= block_threshold {
            match self.config.block_duration() {
                None => match self.add_black_list(id, true).await {
                    Ok(()) | Err(TurnstileError::BlackListExists) => {}
                    Err(e) => return Err(e),
                },
                Some(duration) => self.store.set_expiry(&key, duration).await?,
            }
            debug!(
                limiter = %self.name(),
                id = %id,
                count,
                permanent = self.config.block_duration().is_none(),
                "Block threshold reached"
            );
            return Ok(Verdict::new(count, Decision::Blocked));
        }

        let warning_threshold = self.config.warning_threshold;
        if warning_threshold > 0 && count >= warning_threshold {
            debug!(limiter = %self.name(), id = %id, count, "Warning threshold reached");
            return Ok(Verdict::new(count, Decision::Warned));
        }

        Ok(Verdict::new(count, Decision::Allowed))
    }

    /// Like [`check`](Self::check), but reports warnings and blocks as the
    /// configured rejection errors. Returns the window count when allowed.
    pub async fn enforce(&self, id: &str) -> Result<u64> {
        let verdict = self.check(id).await?;
        match verdict.decision {
            Decision::Allowed => Ok(verdict.count),
            Decision::Warned => Err(TurnstileError::Warned(self.config.warning_error.clone())),
            Decision::Blocked => Err(TurnstileError::Blocked(self.config.block_error.clone())),
        }
    }

    /// Delete the window counter for `id`.
    pub async fn check_reset(&self, id: &str) -> Result<()> {
        self.store.delete(&self.counter_key(id)).await?;
        Ok(())
    }

    /// Apply a sync message received from another instance.
    ///
    /// The mutation is applied locally without being published again.
    /// Malformed messages and unknown actions are ignored.
    pub async fn sub(&self, message: &str) -> Result<()> {
        let Some(SyncMessage { action, id }) = SyncMessage::from_wire(message) else {
            trace!(limiter = %self.name(), message = %message, "Ignoring sync message");
            return Ok(());
        };

        match action {
            SyncAction::AddWhiteList => self.add_white_list(&id, false).await,
            SyncAction::RemoveWhiteList => self.remove_white_list(&id, false).await,
            SyncAction::AddBlackList => self.add_black_list(&id, false).await,
            SyncAction::RemoveBlackList => self.remove_black_list(&id, false).await,
        }
    }

    /// Best-effort broadcast of a list mutation on the limiter's channel.
    pub(crate) async fn publish(&self, action: SyncAction, id: &str) {
        let Some(publisher) = &self.publisher else {
            return;
        };

        let message = SyncMessage::new(action, id).to_wire();
        if let Err(e) = publisher.publish(self.name(), &message).await {
            warn!(
                limiter = %self.name(),
                message = %message,
                error = %e,
                "Failed to publish sync message"
            );
        }
    }
}
