//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Rejection, Result, TurnstileError};

/// Prefix for environment variable overrides, e.g. `TURNSTILE__LIMITER__NAME`.
const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Application name, prepended to the limiter name when set
    #[serde(default)]
    pub application_name: Option<String>,

    /// Shared store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,
}

/// Shared store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL, used for both counters and the sync channel
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration for a single named limiter.
///
/// The name is used as the prefix of every key the limiter writes, so it must
/// be unique among all limiters sharing one store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Limiter name
    #[serde(default)]
    pub name: String,

    /// Counting window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Count at which callers are warned (0 disables warnings)
    #[serde(default)]
    pub warning_threshold: u64,

    /// Count at which callers are blocked (0 disables blocking)
    #[serde(default)]
    pub block_threshold: u64,

    /// Block duration in milliseconds (0 blacklists the identity permanently)
    #[serde(default)]
    pub block_duration_ms: u64,

    /// Rejection returned to warned callers
    #[serde(default = "Rejection::warned")]
    pub warning_error: Rejection,

    /// Rejection returned to blocked callers
    #[serde(default = "Rejection::blocked")]
    pub block_error: Rejection,

    /// Identities that are always allowed
    #[serde(default)]
    pub white_list: Vec<String>,

    /// Identities that are always denied
    #[serde(default)]
    pub black_list: Vec<String>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            window_ms: default_window_ms(),
            warning_threshold: 0,
            block_threshold: 0,
            block_duration_ms: 0,
            warning_error: Rejection::warned(),
            block_error: Rejection::blocked(),
            white_list: Vec::new(),
            black_list: Vec::new(),
        }
    }
}

fn default_window_ms() -> u64 {
    60_000
}

/// Whole milliseconds in `duration`, rounding a non-zero sub-millisecond
/// remainder up so a non-zero duration never becomes 0.
fn ceil_millis(duration: Duration) -> u64 {
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    if duration.subsec_nanos() % 1_000_000 != 0 {
        millis.saturating_add(1)
    } else {
        millis
    }
}

impl LimiterConfig {
    /// Create a limiter configuration with the given name and window.
    pub fn new(name: impl Into<String>, window: Duration) -> Self {
        Self {
            name: name.into(),
            window_ms: ceil_millis(window),
            ..Self::default()
        }
    }

    /// Set the warning threshold.
    pub fn warn_at(mut self, count: u64) -> Self {
        self.warning_threshold = count;
        self
    }

    /// Set the block threshold and block duration.
    pub fn block_at(mut self, count: u64, duration: Duration) -> Self {
        self.block_threshold = count;
        self.block_duration_ms = ceil_millis(duration);
        self
    }

    /// Counting window.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Block duration, `None` when blocking is permanent.
    pub fn block_duration(&self) -> Option<Duration> {
        match self.block_duration_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Check the configuration for values the limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(TurnstileError::Config("limiter name must be set".to_string()));
        }
        if self.window_ms == 0 {
            return Err(TurnstileError::Config(format!(
                "limiter '{}': window must be greater than zero",
                self.name
            )));
        }
        Ok(())
    }
}

impl TurnstileConfig {
    /// Load configuration from an optional YAML file layered with environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| TurnstileError::Config(e.to_string()))
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| TurnstileError::Config(e.to_string()))
    }

    /// The limiter configuration with the application name applied as a prefix.
    pub fn effective_limiter(&self) -> LimiterConfig {
        let mut limiter = self.limiter.clone();
        if let Some(app) = self.application_name.as_deref().filter(|app| !app.is_empty()) {
            limiter.name = format!("{}-{}", app, limiter.name);
        }
        limiter
    }
}
