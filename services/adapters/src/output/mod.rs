//! Output adapters for delivering normalized market data
//!
//! Feeds push every decoded event into an [`EventSink`]. The sink is shared (`Arc<dyn EventSink>`)
//! and supplied by whoever builds the feed:
//! - [`MpscEventSink`] forwards into a bounded tokio channel for a separate consumer task
//! - [`LoggingEventSink`] writes events to the log, for dry runs

use async_trait::async_trait;
use tokio::sync::mpsc;
use types::{BookUpdate, NormalizedEvent, Ticker, Trade};

use crate::input::OrderBookReplica;
use crate::{AdapterError, Result};

/// Receiver of normalized ticker, trade and book events
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Best bid/ask changed
    async fn on_ticker(&self, ticker: Ticker) -> Result<()>;

    /// One execution
    async fn on_trade(&self, trade: Trade) -> Result<()>;

    /// Book snapshot or delta. `book` is the replica after the update was applied.
    async fn on_book(&self, book: &OrderBookReplica, update: &BookUpdate) -> Result<()>;
}

/// Forwards events into a `tokio::sync::mpsc` channel.
///
/// Awaiting channel capacity is the only backpressure: a slow consumer suspends the feed.
#[derive(Debug, Clone)]
pub struct MpscEventSink {
    tx: mpsc::Sender<NormalizedEvent>,
}

impl MpscEventSink {
    /// Sink plus the receiving end, with room for `capacity` events
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<NormalizedEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    async fn forward(&self, event: NormalizedEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|e| AdapterError::SinkClosed(format!("dropped {:?} event", e.0.kind())))
    }
}

#[async_trait]
impl EventSink for MpscEventSink {
    async fn on_ticker(&self, ticker: Ticker) -> Result<()> {
        self.forward(ticker.into()).await
    }

    async fn on_trade(&self, trade: Trade) -> Result<()> {
        self.forward(trade.into()).await
    }

    async fn on_book(&self, _book: &OrderBookReplica, update: &BookUpdate) -> Result<()> {
        self.forward(update.clone().into()).await
    }
}

/// Logs every event at debug level and the top of book at info level on snapshots
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn on_ticker(&self, ticker: Ticker) -> Result<()> {
        tracing::debug!(
            "ticker {} bid={:?} ask={:?}",
            ticker.symbol,
            ticker.bid,
            ticker.ask
        );
        Ok(())
    }

    async fn on_trade(&self, trade: Trade) -> Result<()> {
        tracing::debug!(
            "trade {} {} {}@{} id={}",
            trade.symbol,
            trade.side,
            trade.amount,
            trade.price,
            trade.order_id
        );
        Ok(())
    }

    async fn on_book(&self, book: &OrderBookReplica, update: &BookUpdate) -> Result<()> {
        if update.is_snapshot {
            tracing::info!(
                "book snapshot {} best bid={:?} best ask={:?}",
                update.symbol,
                book.best_bid(),
                book.best_ask()
            );
        } else {
            tracing::debug!(
                "book delta {} {} levels",
                update.symbol,
                update.delta.as_ref().map_or(0, |d| d.len())
            );
        }
        Ok(())
    }
}
