//! Turnstile - per-identity rate limiting with shared overrides
//!
//! This crate decides, per identity string, whether a request may proceed,
//! should be warned, or must be blocked, based on a counting window kept in a
//! shared store. Whitelist and blacklist overrides are persisted in the store,
//! cached locally, and kept in sync across instances over a publish/subscribe
//! channel.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod sync;

pub use config::{LimiterConfig, TurnstileConfig};
pub use error::{Rejection, Result, TurnstileError};
pub use ratelimit::{CounterStore, Decision, MemoryStore, RateLimiter, Verdict};
pub use sync::{LocalBus, Publisher};
