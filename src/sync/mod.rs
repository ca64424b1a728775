//! Cross-instance synchronization of whitelist and blacklist changes.
//!
//! List mutations made with `publish = true` are broadcast as short
//! `<action>-<id>` messages on a channel named after the limiter. Peers feed
//! what they receive into [`RateLimiter::sub`](crate::ratelimit::RateLimiter::sub),
//! which replays the mutation locally without publishing it again.

mod listener;
mod message;
mod publisher;
#[cfg(feature = "redis")]
mod redis_pubsub;

pub use listener::spawn_listener;
pub use message::{SyncAction, SyncMessage};
pub use publisher::{LocalBus, MessageStream, Publisher, SyncError};
#[cfg(feature = "redis")]
pub use redis_pubsub::{subscribe as redis_subscribe, RedisPublisher};
