//! Inbound sync loop.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use super::publisher::MessageStream;
use crate::error::TurnstileError;
use crate::ratelimit::RateLimiter;

/// Feed every message from `messages` into [`RateLimiter::sub`].
///
/// Dispatch errors are logged and never stop the loop. The task ends when the
/// stream ends.
pub fn spawn_listener(limiter: Arc<RateLimiter>, mut messages: MessageStream) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(limiter = %limiter.name(), "Sync listener started");

        while let Some(message) = messages.next().await {
            match limiter.sub(&message).await {
                Ok(()) => debug!(limiter = %limiter.name(), message = %message, "Applied sync message"),
                // Our own broadcasts come back to us; the entry is already cached.
                Err(TurnstileError::WhiteListExists | TurnstileError::BlackListExists) => {
                    debug!(limiter = %limiter.name(), message = %message, "Sync message already applied")
                }
                Err(e) => warn!(
                    limiter = %limiter.name(),
                    message = %message,
                    error = %e,
                    "Failed to apply sync message"
                ),
            }
        }

        info!(limiter = %limiter.name(), "Sync listener stopped");
    })
}
