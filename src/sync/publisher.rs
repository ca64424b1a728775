//! Publisher contract and an in-process bus.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{trace, warn};

/// Default number of messages buffered per subscriber on a [`LocalBus`].
const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Stream of inbound sync message bodies for one channel.
pub type MessageStream = BoxStream<'static, String>;

/// Errors from the sync transport.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Generic transport failure
    #[error("Sync transport error: {0}")]
    Transport(String),

    /// Redis failures
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Fire-and-forget broadcast of sync messages.
///
/// Callers never retry and only log failures.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `message` on `channel`.
    async fn publish(&self, channel: &str, message: &str) -> Result<(), SyncError>;
}

#[derive(Debug, Clone)]
struct Envelope {
    channel: String,
    message: String,
}

/// An in-process publish/subscribe bus.
///
/// Several limiters in one process can share a bus as their publisher and
/// subscribe to each other's channels. Slow subscribers lose the oldest
/// messages once the buffer fills.
#[derive(Debug, Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<Envelope>,
}

impl LocalBus {
    /// Create a bus with the default buffer size.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Create a bus buffering up to `capacity` messages per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to messages published on `channel` from now on.
    pub fn subscribe(&self, channel: &str) -> MessageStream {
        let channel = channel.to_string();
        let stream = BroadcastStream::new(self.sender.subscribe()).filter_map(move |item| {
            match item {
                Ok(envelope) if envelope.channel == channel => Some(envelope.message),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(channel = %channel, skipped, "Sync subscriber lagged, messages dropped");
                    None
                }
            }
        });
        Box::pin(stream)
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for LocalBus {
    async fn publish(&self, channel: &str, message: &str) -> Result<(), SyncError> {
        // No subscribers is not an error, matching Redis PUBLISH.
        let receivers = self
            .sender
            .send(Envelope {
                channel: channel.to_string(),
                message: message.to_string(),
            })
            .unwrap_or(0);
        trace!(channel = %channel, message = %message, receivers, "Published on local bus");
        Ok(())
    }
}
