mod env;
pub use env::apply_env_overrides;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Largest page size the feed will request
pub const MAX_PAGE_SIZE: u32 = 500;

/// Complete live feed configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub feed: SubscriptionConfig,
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// What to subscribe to
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Request every vessel at once instead of paging
    #[serde(default)]
    pub all_vessels: bool,
}

fn default_region() -> String {
    "global".to_string()
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            page_size: default_page_size(),
            all_vessels: false,
        }
    }
}

/// Live-update socket settings
#[derive(Debug, Clone, Deserialize)]
pub struct SocketConfig {
    #[serde(default = "default_socket_url")]
    pub url: String,
    /// Delay before reconnecting after the socket closes
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Delay before retrying the socket while in polling fallback
    #[serde(default = "default_fallback_retry_ms")]
    pub fallback_retry_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_socket_url() -> String {
    "ws://localhost:3000/ws/vessels".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_fallback_retry_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl SocketConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn fallback_retry(&self) -> Duration {
        Duration::from_millis(self.fallback_retry_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            url: default_socket_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            fallback_retry_ms: default_fallback_retry_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// HTTP polling fallback settings
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Backend base URL (e.g., "http://localhost:3000")
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_poll_interval_ms() -> u64 {
    30_000
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Region cache settings
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_ttl_seconds() -> u64 {
    300
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<FeedConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path))?;
    let config: FeedConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config '{}'", path))?;
    Ok(config)
}
