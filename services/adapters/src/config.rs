//! Configuration module for adapters
//!
//! TOML file with environment variable overrides, following the per-venue collector layout:
//!
//! ```toml
//! raw_capture = false
//!
//! [websocket]
//! url = "wss://api.hitbtc.com/api/2/ws"
//! connect_timeout_ms = 10000
//!
//! [rest]
//! symbols_url = "https://api.hitbtc.com/api/2/public/symbol"
//! throttle_limit = 100
//!
//! [subscription]
//! ticker = ["BTC-USD"]
//! trades = ["BTC-USD", "ETH-BTC"]
//! orderbook = ["BTC-USD"]
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::input::collectors::hitbtc::{HITBTC_SYMBOLS_URL, HITBTC_WS_URL};
use crate::input::{FeedChannel, Subscription};
use crate::{AdapterError, Result};

/// Complete feed service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Hand every raw payload to the tracing raw sink
    pub raw_capture: bool,
    pub websocket: WebSocketConfig,
    pub rest: RestConfig,
    pub subscription: Subscription,
    pub symbols: SymbolConfig,
    pub reconnect: ReconnectConfig,
}

/// WebSocket connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    pub url: String,
    pub connect_timeout_ms: u64,
    /// Base of generated connection ids (`{base}.ws.{n}`)
    pub connection_id_base: String,
}

/// REST endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    pub symbols_url: String,
    /// Request weight allowed per wall-clock minute
    pub throttle_limit: u32,
    /// Reported only; throttle buckets are one minute wide
    pub throttle_interval_secs: u64,
    pub request_timeout_ms: u64,
}

/// Symbol table configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolConfig {
    /// Pass unknown exchange symbols through on ticker, trade and update frames
    pub allow_missing: bool,
    /// Separator between base and quote in standardized symbols
    pub separator: String,
}

/// Reconnect backoff configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Consecutive failed sessions before giving up
    pub max_attempts: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            raw_capture: false,
            websocket: WebSocketConfig::default(),
            rest: RestConfig::default(),
            subscription: Subscription::new()
                .with(FeedChannel::Ticker, ["BTC-USD"])
                .with(FeedChannel::Trades, ["BTC-USD", "ETH-BTC"])
                .with(FeedChannel::Orderbook, ["BTC-USD"]),
            symbols: SymbolConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: HITBTC_WS_URL.to_string(),
            connect_timeout_ms: 10000,
            connection_id_base: "hitbtc".to_string(),
        }
    }
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            symbols_url: HITBTC_SYMBOLS_URL.to_string(),
            throttle_limit: 100,
            throttle_interval_secs: 60,
            request_timeout_ms: 10000,
        }
    }
}

impl Default for SymbolConfig {
    fn default() -> Self {
        Self {
            allow_missing: false,
            separator: "-".to_string(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_backoff_ms: 1000,
            max_backoff_ms: 60000,
            max_attempts: 10,
        }
    }
}

impl WebSocketConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl RestConfig {
    pub fn throttle_interval(&self) -> Duration {
        Duration::from_secs(self.throttle_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl FeedConfig {
    /// Load configuration from TOML file with environment variable overrides
    pub fn from_toml_with_env_overrides(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path).map_err(|e| {
            AdapterError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut config = Self::from_toml_str(&config_str)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse TOML without overrides
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        toml::from_str(config_str).map_err(|e| {
            AdapterError::Configuration(format!("Failed to parse TOML configuration: {}", e))
        })
    }

    /// Apply `HITBTC_WS_URL`, `HITBTC_SYMBOLS_URL`, `HITBTC_PAIRS` and `HITBTC_CHANNELS`.
    ///
    /// Pairs and channels are comma separated. When either is given the subscription becomes
    /// every channel × every pair, keeping the configured value for the one not overridden.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("HITBTC_WS_URL") {
            self.websocket.url = url;
        }

        if let Some(url) = lookup("HITBTC_SYMBOLS_URL") {
            self.rest.symbols_url = url;
        }

        let pairs = lookup("HITBTC_PAIRS").map(|v| split_list(&v));
        let channels = lookup("HITBTC_CHANNELS")
            .map(|v| {
                split_list(&v)
                    .iter()
                    .map(|c| c.parse::<FeedChannel>())
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?;

        if pairs.is_some() || channels.is_some() {
            let pairs = pairs.unwrap_or_else(|| {
                self.subscription
                    .all_symbols()
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            });
            let channels = channels.unwrap_or_else(|| {
                FeedChannel::ALL
                    .into_iter()
                    .filter(|c| self.subscription.symbols(*c).next().is_some())
                    .collect()
            });

            self.subscription = channels.into_iter().fold(Subscription::new(), |sub, channel| {
                sub.with(channel, pairs.iter().cloned())
            });
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.subscription.is_empty() {
            return Err(AdapterError::Configuration(
                "No channel/pair subscriptions configured".to_string(),
            ));
        }

        let ws = Url::parse(&self.websocket.url).map_err(|e| {
            AdapterError::Configuration(format!("Invalid WebSocket URL {}: {}", self.websocket.url, e))
        })?;
        if ws.scheme() != "wss" {
            return Err(AdapterError::Configuration(format!(
                "WebSocket URL must use wss://, got {}",
                self.websocket.url
            )));
        }

        let rest = Url::parse(&self.rest.symbols_url).map_err(|e| {
            AdapterError::Configuration(format!(
                "Invalid symbols URL {}: {}",
                self.rest.symbols_url, e
            ))
        })?;
        if rest.scheme() != "https" {
            return Err(AdapterError::Configuration(format!(
                "Symbols URL must use https://, got {}",
                self.rest.symbols_url
            )));
        }

        if self.rest.throttle_limit == 0 {
            return Err(AdapterError::Configuration(
                "throttle_limit must be positive".to_string(),
            ));
        }

        if self.reconnect.base_backoff_ms > self.reconnect.max_backoff_ms {
            return Err(AdapterError::Configuration(format!(
                "base_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.reconnect.base_backoff_ms, self.reconnect.max_backoff_ms
            )));
        }

        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Exponential reconnect backoff: `base * 2^n`, capped at `max_backoff_ms`, with `n` capped at 6.
///
/// Counts consecutive failed sessions; [`ReconnectPolicy::reset`] after a session that streamed.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts: u32,
    multiplier: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
            multiplier: 0,
        }
    }

    /// Delay before the next attempt, or `None` once `max_attempts` is exhausted
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.attempts >= self.config.max_attempts {
            return None;
        }
        self.attempts += 1;

        let backoff_ms = self
            .config
            .base_backoff_ms
            .saturating_mul(2_u64.pow(self.multiplier));
        let capped_backoff = backoff_ms.min(self.config.max_backoff_ms);

        // 2^6 = 64x
        self.multiplier = (self.multiplier + 1).min(6);

        Some(Duration::from_millis(capped_backoff))
    }

    /// Forget past failures
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.multiplier = 0;
    }

    /// Consecutive attempts so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}
