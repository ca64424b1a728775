//! Error types for the Turnstile limiter.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ratelimit::StoreError;

/// A coded rejection handed back to callers when an identity is warned or blocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Stable error code
    pub code: String,
    /// Human readable message
    pub message: String,
}

impl Rejection {
    /// Create a new rejection descriptor.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The default descriptor for blocked identities.
    pub fn blocked() -> Self {
        Self::new("4300", "forbidden")
    }

    /// The default descriptor for warned identities.
    pub fn warned() -> Self {
        Self::new("4301", "too many requests")
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The identity is denied
    #[error("{0}")]
    Blocked(Rejection),

    /// The identity is allowed but crossed the warning threshold
    #[error("{0}")]
    Warned(Rejection),

    /// Administrative add of an id already cached in the whitelist
    #[error("4303: whiteList exists")]
    WhiteListExists,

    /// Administrative add of an id already cached in the blacklist
    #[error("4304: blackList exists")]
    BlackListExists,

    /// Counter store failures, passed through unchanged
    #[error(transparent)]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
