//! Channels and symbols to subscribe on connect

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::AdapterError;

/// Data channel offered by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedChannel {
    /// Best bid / best ask
    Ticker,
    /// Executions
    Trades,
    /// Level 2 book: snapshot followed by incremental updates
    #[serde(alias = "l2_book")]
    Orderbook,
}

impl FeedChannel {
    /// Every channel in subscription order
    pub const ALL: [FeedChannel; 3] = [
        FeedChannel::Ticker,
        FeedChannel::Trades,
        FeedChannel::Orderbook,
    ];

    /// HitBTC JSON-RPC method that subscribes to this channel
    pub fn subscribe_method(self) -> &'static str {
        match self {
            FeedChannel::Ticker => "subscribeTicker",
            FeedChannel::Trades => "subscribeTrades",
            FeedChannel::Orderbook => "subscribeOrderbook",
        }
    }
}

impl fmt::Display for FeedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedChannel::Ticker => write!(f, "ticker"),
            FeedChannel::Trades => write!(f, "trades"),
            FeedChannel::Orderbook => write!(f, "orderbook"),
        }
    }
}

impl FromStr for FeedChannel {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ticker" => Ok(FeedChannel::Ticker),
            "trades" => Ok(FeedChannel::Trades),
            "orderbook" | "l2_book" => Ok(FeedChannel::Orderbook),
            other => Err(AdapterError::Configuration(format!(
                "Unknown feed channel: {}",
                other
            ))),
        }
    }
}

/// Standardized symbols per channel.
///
/// Set semantics: adding the same (channel, symbol) twice still produces one subscribe frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subscription {
    channels: BTreeMap<FeedChannel, BTreeSet<String>>,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one symbol to `channel`. Returns false if it was already present.
    pub fn add(&mut self, channel: FeedChannel, symbol: impl Into<String>) -> bool {
        self.channels
            .entry(channel)
            .or_default()
            .insert(symbol.into())
    }

    /// Builder form of [`Subscription::add`] for several symbols
    pub fn with<I, S>(mut self, channel: FeedChannel, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for symbol in symbols {
            self.add(channel, symbol);
        }
        self
    }

    /// Every (channel, symbol) pair in deterministic order
    pub fn pairs(&self) -> impl Iterator<Item = (FeedChannel, &str)> + '_ {
        self.channels.iter().flat_map(|(channel, symbols)| {
            symbols.iter().map(move |symbol| (*channel, symbol.as_str()))
        })
    }

    /// Symbols subscribed on `channel`
    pub fn symbols(&self, channel: FeedChannel) -> impl Iterator<Item = &str> + '_ {
        self.channels
            .get(&channel)
            .into_iter()
            .flat_map(|symbols| symbols.iter().map(String::as_str))
    }

    /// Distinct symbols across all channels
    pub fn all_symbols(&self) -> BTreeSet<&str> {
        self.channels
            .values()
            .flat_map(|symbols| symbols.iter().map(String::as_str))
            .collect()
    }

    /// Number of subscribe frames this subscription produces
    pub fn len(&self) -> usize {
        self.channels.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
