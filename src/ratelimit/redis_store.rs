//! Redis-backed counter store.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::time::Duration;
use tracing::info;

use super::store::{CounterStore, StoreError};

/// Atomic INCR + PEXPIRE so a key never outlives its window without a TTL.
///
/// `ARGV[1]` is the window in milliseconds, `ARGV[2]` the cap (0 = uncapped).
const INCREMENT_SCRIPT: &str = r#"
    local cap = tonumber(ARGV[2])
    if cap > 0 then
        local current = tonumber(redis.call('GET', KEYS[1]) or '0')
        if current >= cap then
            return current
        end
    end
    local count = redis.call('INCR', KEYS[1])
    if count == 1 then
        redis.call('PEXPIRE', KEYS[1], ARGV[1])
    end
    return count
"#;

/// A counter store on a shared Redis server.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    increment: Script,
}

impl RedisStore {
    /// Connect to the Redis server at `url`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let store = Self::with_client(client).await?;
        info!(url = %url, "Connected to Redis store");
        Ok(store)
    }

    /// Build a store from an existing client.
    pub async fn with_client(client: redis::Client) -> Result<Self, StoreError> {
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            increment: Script::new(INCREMENT_SCRIPT),
        })
    }
}

/// Redis expects signed millisecond values.
fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment_window(
        &self,
        key: &str,
        threshold: u64,
        window: Duration,
    ) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let count: u64 = self
            .increment
            .key(key)
            .arg(millis(window))
            .arg(threshold)
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let () = conn.pexpire(key, millis(ttl)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let () = conn.del(key).await?;
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let () = conn.sadd(key, member).await?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let () = conn.srem(key, member).await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }
}
