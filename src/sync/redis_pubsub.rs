//! Redis PUBLISH/SUBSCRIBE transport for sync messages.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{info, warn};

use super::publisher::{MessageStream, Publisher, SyncError};

/// Publishes sync messages with Redis PUBLISH.
#[derive(Clone)]
pub struct RedisPublisher {
    conn: ConnectionManager,
}

impl RedisPublisher {
    /// Connect to the Redis server behind `client`.
    pub async fn connect(client: redis::Client) -> Result<Self, SyncError> {
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    async fn publish(&self, channel: &str, message: &str) -> Result<(), SyncError> {
        let mut conn = self.conn.clone();
        let () = conn.publish(channel, message).await?;
        Ok(())
    }
}

/// Subscribe to `channel` on a dedicated connection.
///
/// Payloads that are not valid UTF-8 are dropped. The stream ends when the
/// connection closes.
pub async fn subscribe(client: &redis::Client, channel: &str) -> Result<MessageStream, SyncError> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;
    info!(channel = %channel, "Subscribed to sync channel");

    let stream = pubsub.into_on_message().filter_map(|msg| async move {
        match msg.get_payload::<String>() {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!(channel = %msg.get_channel_name(), error = %e, "Dropping undecodable sync message");
                None
            }
        }
    });
    Ok(Box::pin(stream))
}
