//! Rate limiting logic and state management.

mod access;
mod limiter;
mod store;
#[cfg(feature = "redis")]
mod redis_store;

pub use access::{AccessList, ListKind};
pub use limiter::{Decision, RateLimiter, Verdict};
pub use store::{CounterStore, MemoryStore, StoreError};
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

#[cfg(test)]
pub(crate) mod test_support;
