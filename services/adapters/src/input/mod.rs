//! Input adapters for collecting market data from exchange feeds

pub mod book;
pub mod collectors;
pub mod sequence;
pub mod subscription;
pub mod symbols;

use async_trait::async_trait;
use network::StreamingChannel;
use std::fmt;

use crate::Result;

pub use book::{BookStore, OrderBookReplica};
pub use sequence::SequenceGuard;
pub use subscription::{FeedChannel, Subscription};
pub use symbols::SymbolMap;

/// Per-connection feed lifecycle
///
/// ```text
/// Disconnected → Subscribing → Streaming → Gap | ConnectionLost → Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// No session, or the previous one was torn down
    Disconnected,
    /// Subscribe frames are being written
    Subscribing,
    /// Frames are decoded and applied
    Streaming,
    /// Sequence continuity broke; the connection was closed and needs a fresh snapshot
    Gap,
    /// Transport failed or the peer ended the stream
    ConnectionLost,
}

impl FeedState {
    /// True in the terminal states a supervisor must react to
    pub fn is_terminal(self) -> bool {
        matches!(self, FeedState::Gap | FeedState::ConnectionLost)
    }
}

impl fmt::Display for FeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeedState::Disconnected => "disconnected",
            FeedState::Subscribing => "subscribing",
            FeedState::Streaming => "streaming",
            FeedState::Gap => "gap",
            FeedState::ConnectionLost => "connection_lost",
        };
        f.write_str(name)
    }
}

/// Core trait for exchange feed adapters driven over a streaming channel
#[async_trait]
pub trait ExchangeFeed: Send {
    /// Exchange name used in logs
    fn exchange(&self) -> &'static str;

    /// Current lifecycle state
    fn state(&self) -> FeedState;

    /// Write one subscribe frame per (channel, symbol) pair. Returns the number of frames written.
    async fn subscribe(&mut self, channel: &mut dyn StreamingChannel) -> Result<usize>;

    /// Open (if needed), subscribe and process frames until the session ends.
    ///
    /// Always returns an error: a sequence gap, a lost connection, or a closed event sink.
    async fn run(&mut self, channel: &mut dyn StreamingChannel) -> Result<()>;
}
