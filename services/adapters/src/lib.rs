//! # Feed Adapters - Exchange Frame Decoding and Book Replication
//!
//! ## Purpose
//!
//! Turns raw exchange WebSocket frames into normalized ticker, trade and level-2 book events.
//! Each adapter owns its subscription, a per-symbol sequence guard and the order book replicas
//! built from snapshots and incremental updates.
//!
//! ## Integration Points
//!
//! - **Input Sources**: any [`network::StreamingChannel`] (a `WebSocketChannel` in production)
//! - **Symbol Metadata**: exchange symbol table fetched over an HTTP channel, see [`SymbolMap`]
//! - **Output Destinations**: an [`EventSink`], usually [`MpscEventSink`] feeding a consumer task
//! - **Configuration**: [`FeedConfig`] loaded from TOML with environment overrides
//! - **Error Handling**: [`AdapterError`] classifies failures into drop-and-continue, resync and
//!   permanent
//!
//! ## Architecture Role
//!
//! ```text
//! Exchange ──wss──► StreamingChannel ──text──► HitBtcFeed ──events──► EventSink
//!                                               │  ├─ SequenceGuard
//!                                               │  └─ BookStore
//!                                               └─ Gap / ConnectionLost ──► supervisor reconnects
//! ```
//!
//! A feed never reconnects on its own. [`ExchangeFeed::run`] returns when the session ends and the
//! binary decides, through a [`ReconnectPolicy`], whether and when to start another one.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use adapter_service::{ExchangeFeed, FeedChannel, HitBtcFeed, MpscEventSink, Subscription, SymbolMap};
//! use network::{ConnectionIdGenerator, TracingRawSink, TransportKind, WebSocketChannel};
//!
//! # async fn demo() -> adapter_service::Result<()> {
//! let symbols = SymbolMap::from_pairs([("BTC-USD", "BTCUSD")]);
//! let subscription = Subscription::new().with(FeedChannel::Orderbook, ["BTC-USD"]);
//! let (sink, mut events) = MpscEventSink::channel(10_000);
//!
//! let ids = ConnectionIdGenerator::new();
//! let mut channel = WebSocketChannel::new(
//!     "wss://api.hitbtc.com/api/2/ws",
//!     ids.identity("hitbtc", TransportKind::Ws),
//!     Some(Arc::new(TracingRawSink)),
//! )?;
//!
//! let mut feed = HitBtcFeed::new(symbols, subscription, Arc::new(sink))?;
//! tokio::spawn(async move { while let Some(_event) = events.recv().await {} });
//! let _ = feed.run(&mut channel).await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod input;
pub mod output;

pub use config::{
    FeedConfig, ReconnectConfig, ReconnectPolicy, RestConfig, SymbolConfig, WebSocketConfig,
};
pub use error::{AdapterError, Result};
pub use input::collectors::{HitBtcFeed, HitBtcFrame};
pub use input::{
    BookStore, ExchangeFeed, FeedChannel, FeedState, OrderBookReplica, SequenceGuard,
    Subscription, SymbolMap,
};
pub use output::{EventSink, LoggingEventSink, MpscEventSink};

// Re-export the normalized event model for convenience
pub use types::{BookDelta, BookSide, BookUpdate, NormalizedEvent, Side, Ticker, Trade};
