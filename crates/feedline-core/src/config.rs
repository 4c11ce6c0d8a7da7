use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FeedlineError, Result};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_BATCH_LIMIT: usize = 100;
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;
pub const DEFAULT_RETENTION_DAYS: u32 = 7;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3_600;
pub const MAX_INBOUND_BYTES: usize = 64 * 1024; // subscribers have nothing to say beyond pings

/// Top-level config (feedline.toml + FEEDLINE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedlineConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Polling and fan-out knobs for the change feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedConfig {
    /// How often the event log is queried for new rows.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum rows fetched per poll cycle. Larger bursts drain over
    /// several cycles.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    /// Upper bound on a single send to one subscriber. A send that does not
    /// complete in time drops that subscriber.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Cursor value at process start; only ids strictly greater are
    /// delivered. Defaults to the lowest possible id.
    #[serde(default = "default_start_cursor")]
    pub start_cursor: i64,
    /// Outbound messages queued per subscriber before sends start waiting.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            batch_limit: DEFAULT_BATCH_LIMIT,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            start_cursor: i64::MIN,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

impl FeedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Reject values that would make the feed spin, stall or never deliver.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(FeedlineError::Config(
                "feed.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.batch_limit == 0 {
            return Err(FeedlineError::Config(
                "feed.batch_limit must be greater than zero".to_string(),
            ));
        }
        if self.send_timeout_ms == 0 {
            return Err(FeedlineError::Config(
                "feed.send_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.subscriber_buffer == 0 {
            return Err(FeedlineError::Config(
                "feed.subscriber_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Periodic deletion of old rows from the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Off by default: the log belongs to its producers.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_retention_days")]
    pub max_age_days: u32,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_age_days: DEFAULT_RETENTION_DAYS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl RetentionConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.max_age_days))
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_batch_limit() -> usize {
    DEFAULT_BATCH_LIMIT
}
fn default_send_timeout_ms() -> u64 {
    DEFAULT_SEND_TIMEOUT_MS
}
fn default_start_cursor() -> i64 {
    i64::MIN
}
fn default_subscriber_buffer() -> usize {
    DEFAULT_SUBSCRIBER_BUFFER
}
fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}
fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.feedline/feedline.db", home)
}

impl FeedlineConfig {
    /// Load config from a TOML file with FEEDLINE_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.feedline/feedline.toml
    ///
    /// Nested keys use a double underscore in env vars, e.g.
    /// `FEEDLINE_FEED__POLL_INTERVAL_MS=250`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        debug!(%path, "loading config");

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("FEEDLINE_").split("__")),
        )
    }

    /// Extract and validate from an already-assembled figment. Missing keys
    /// fall back to defaults.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: FeedlineConfig = Figment::from(Serialized::defaults(Self::default()))
            .merge(figment)
            .extract()
            .map_err(|e| FeedlineError::Config(e.to_string()))?;
        config.feed.validate()?;
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.feedline/feedline.toml", home)
}
