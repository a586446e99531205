//! Client configuration.
//!
//! Layered by figment: struct defaults, then an optional `whatsmini.toml`,
//! then `WHATSMINI_*` environment variables. Double underscore nests into
//! sections:
//!
//!   `WHATSMINI_API_BASE=http://localhost:8000`
//!   `WHATSMINI_RETRY__MAX_RETRIES=4`

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "whatsmini.toml";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Figment(#[from] Box<figment::Error>),
}

/// Timeout and retry budget for one logical HTTP operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Per-attempt timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the initial attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pause between a failed attempt and the next one.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy from raw millisecond values.
    #[must_use]
    pub const fn new(timeout_ms: u64, max_retries: u32, retry_delay_ms: u64) -> Self {
        Self {
            timeout_ms,
            max_retries,
            retry_delay_ms,
        }
    }

    /// Per-attempt timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay between attempts.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Total attempts including the first one.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Exponential backoff for real-time channel reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Give up after this many consecutive failed reconnects. `None` retries forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: None,
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnect number `attempt` (zero-based), capped at `max_delay_ms`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(30);
        let delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Whether another reconnect is allowed after `failures` consecutive failures.
    #[must_use]
    pub fn allows(&self, failures: u32) -> bool {
        self.max_attempts.is_none_or(|max| failures < max)
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// HTTP origin of the backend, without trailing slash.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Real-time origin. Derived from `api_base` when unset.
    #[serde(default)]
    pub ws_base: Option<String>,
    /// Lightweight path hit before mutating requests to wake a sleeping backend.
    #[serde(default = "default_wake_path")]
    pub wake_path: String,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub reconnect: BackoffPolicy,
    /// Reconnect the channel after unexpected closes, following `reconnect`.
    #[serde(default)]
    pub auto_reconnect: bool,
    /// Where the session record lives. Platform data dir when unset.
    #[serde(default)]
    pub session_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            ws_base: None,
            wake_path: default_wake_path(),
            retry: RetryPolicy::default(),
            reconnect: BackoffPolicy::default(),
            auto_reconnect: false,
            session_file: None,
        }
    }
}

impl ClientConfig {
    /// Configuration pointing at `api_base` with every other field defaulted.
    #[must_use]
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            ..Self::default()
        }
    }

    /// API origin with any trailing slash removed.
    #[must_use]
    pub fn api_base(&self) -> &str {
        self.api_base.trim_end_matches('/')
    }

    /// Real-time origin: explicit `ws_base`, else `api_base` with the scheme
    /// swapped (`https` -> `wss`, `http` -> `ws`).
    #[must_use]
    pub fn ws_base(&self) -> String {
        if let Some(ws_base) = &self.ws_base {
            return ws_base.trim_end_matches('/').to_string();
        }
        let api_base = self.api_base();
        if let Some(rest) = api_base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = api_base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            api_base.to_string()
        }
    }

    /// Build the layered figment: defaults -> config file -> env vars.
    ///
    /// `config_file` defaults to `whatsmini.toml` in the working directory;
    /// a missing file is skipped.
    #[must_use]
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let config_file = config_file.map_or_else(|| PathBuf::from(CONFIG_FILE_NAME), Path::to_path_buf);
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed("WHATSMINI_").split("__"))
    }

    /// Load the layered configuration.
    ///
    /// # Errors
    /// Returns error if a layer contains values of the wrong type.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::figment(config_file)
            .extract()
            .map_err(|e| ConfigError::Figment(Box::new(e)))
    }
}

fn default_api_base() -> String {
    "https://whatsmini.onrender.com".to_string()
}
fn default_wake_path() -> String {
    "/".to_string()
}
const fn default_timeout_ms() -> u64 {
    20_000
}
const fn default_max_retries() -> u32 {
    2
}
const fn default_retry_delay_ms() -> u64 {
    2_000
}
const fn default_base_delay_ms() -> u64 {
    1_000
}
const fn default_max_delay_ms() -> u64 {
    30_000
}
