//! HitBTC WebSocket feed
//!
//! ## Wire format
//!
//! HitBTC speaks JSON-RPC over `wss://api.hitbtc.com/api/2/ws`. Three frame shapes arrive:
//!
//! ```text
//! {"method": "snapshotOrderbook", "params": {"symbol": "ETHBTC", "sequence": 8073827, ...}}
//! {"channel": "ticker", "data": {"symbol": "ETHBTC", "bid": "0.054", ...}}
//! {"jsonrpc": "2.0", "result": true, "id": "hitbtc.ws.0"}   or   {"error": {...}, "id": ...}
//! ```
//!
//! ## Processing order
//!
//! 1. [`HitBtcFrame::decode`] turns the text into a tagged frame. Anything unparsable is a
//!    `MalformedFrame` and is dropped before guard or book state is touched.
//! 2. Frames carrying `params.sequence` are checked against the [`SequenceGuard`]. A gap ends the
//!    session with no book mutation applied.
//! 3. The frame is applied to the [`BookStore`] (book frames) and re-emitted through the
//!    [`EventSink`].

use async_trait::async_trait;
use network::{ChannelError, Clock, StreamingChannel, SystemClock};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use types::{BookSide, BookUpdate, PriceLevel, Side, Ticker, Trade};

use crate::input::{
    BookStore, ExchangeFeed, FeedState, SequenceGuard, Subscription, SymbolMap,
};
use crate::output::EventSink;
use crate::{AdapterError, Result};

/// Public WebSocket endpoint
pub const HITBTC_WS_URL: &str = "wss://api.hitbtc.com/api/2/ws";

/// Public symbol metadata endpoint
pub const HITBTC_SYMBOLS_URL: &str = "https://api.hitbtc.com/api/2/public/symbol";

/// Best bid/ask push
#[derive(Debug, Clone, PartialEq)]
pub struct TickerFrame {
    /// Exchange symbol id
    pub symbol: String,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    /// Exchange time (ns since epoch)
    pub timestamp: u64,
    pub sequence: Option<u64>,
}

/// Order book snapshot or incremental update
#[derive(Debug, Clone, PartialEq)]
pub struct BookFrame {
    /// Exchange symbol id
    pub symbol: String,
    pub bid: Vec<PriceLevel>,
    pub ask: Vec<PriceLevel>,
    pub sequence: Option<u64>,
    /// Exchange time (ns since epoch), when provided
    pub timestamp: Option<u64>,
}

impl BookFrame {
    fn entries(&self) -> impl Iterator<Item = (BookSide, Decimal, Decimal)> + '_ {
        let bids = self.bid.iter().map(|&(p, s)| (BookSide::Bid, p, s));
        let asks = self.ask.iter().map(|&(p, s)| (BookSide::Ask, p, s));
        bids.chain(asks)
    }
}

/// One execution inside a trades frame
#[derive(Debug, Clone, PartialEq)]
pub struct TradeEntry {
    pub order_id: String,
    pub side: Side,
    pub price: Decimal,
    pub amount: Decimal,
    /// Exchange execution time (ns since epoch)
    pub timestamp: u64,
}

/// Batch of executions (`updateTrades` or `snapshotTrades`)
#[derive(Debug, Clone, PartialEq)]
pub struct TradesFrame {
    /// Exchange symbol id
    pub symbol: String,
    pub trades: Vec<TradeEntry>,
    pub sequence: Option<u64>,
}

/// Decoded HitBTC frame
#[derive(Debug, Clone, PartialEq)]
pub enum HitBtcFrame {
    /// `ticker` via `method` or `channel`
    Ticker(TickerFrame),
    /// `snapshotOrderbook`
    Snapshot(BookFrame),
    /// `updateOrderbook`
    Update(BookFrame),
    /// `updateTrades` / `snapshotTrades`
    Trades(TradesFrame),
    /// Successful JSON-RPC result (subscription acknowledgement)
    Result(Value),
    /// Error envelope or an empty result
    ServerError(Value),
    /// Well-formed JSON with a discriminator this feed does not handle
    Unrecognized(String),
}

#[derive(Debug, Deserialize)]
struct RawTicker {
    symbol: String,
    bid: Option<Decimal>,
    ask: Option<Decimal>,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct RawLevel {
    price: Decimal,
    size: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawBook {
    symbol: String,
    #[serde(default)]
    bid: Vec<RawLevel>,
    #[serde(default)]
    ask: Vec<RawLevel>,
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTrade {
    id: Value,
    price: Decimal,
    quantity: Decimal,
    side: Side,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct RawTrades {
    symbol: String,
    data: Vec<RawTrade>,
}

impl HitBtcFrame {
    /// Decode one text frame
    pub fn decode(raw: &str) -> Result<Self> {
        let msg: Value = serde_json::from_str(raw)
            .map_err(|e| AdapterError::malformed(format!("JSON parse error: {}", e)))?;

        if let Some(method) = msg.get("method") {
            let method = method
                .as_str()
                .ok_or_else(|| AdapterError::malformed("method is not a string"))?;
            let params = msg
                .get("params")
                .ok_or_else(|| AdapterError::malformed(format!("{} without params", method)))?;
            let sequence = sequence_of(params)?;

            return match method {
                "ticker" => Ok(HitBtcFrame::Ticker(ticker_frame(params, sequence)?)),
                "snapshotOrderbook" => Ok(HitBtcFrame::Snapshot(book_frame(params, sequence)?)),
                "updateOrderbook" => Ok(HitBtcFrame::Update(book_frame(params, sequence)?)),
                "updateTrades" | "snapshotTrades" => {
                    Ok(HitBtcFrame::Trades(trades_frame(params, sequence)?))
                }
                other => Ok(HitBtcFrame::Unrecognized(format!("method {}", other))),
            };
        }

        if let Some(channel) = msg.get("channel") {
            return match channel.as_str() {
                Some("ticker") => {
                    let data = msg
                        .get("data")
                        .ok_or_else(|| AdapterError::malformed("ticker channel without data"))?;
                    Ok(HitBtcFrame::Ticker(ticker_frame(data, None)?))
                }
                Some(other) => Ok(HitBtcFrame::Unrecognized(format!("channel {}", other))),
                None => Err(AdapterError::malformed("channel is not a string")),
            };
        }

        if msg.get("error").is_some() {
            return Ok(HitBtcFrame::ServerError(msg));
        }

        match msg.get("result") {
            Some(result) if is_truthy(result) => Ok(HitBtcFrame::Result(msg)),
            Some(_) => Ok(HitBtcFrame::ServerError(msg)),
            None => Ok(HitBtcFrame::Unrecognized("no discriminator".to_string())),
        }
    }

    /// `(exchange symbol, sequence)` when the frame is sequenced
    pub fn sequence(&self) -> Option<(&str, u64)> {
        let (symbol, sequence) = match self {
            HitBtcFrame::Ticker(f) => (&f.symbol, f.sequence),
            HitBtcFrame::Snapshot(f) | HitBtcFrame::Update(f) => (&f.symbol, f.sequence),
            HitBtcFrame::Trades(f) => (&f.symbol, f.sequence),
            HitBtcFrame::Result(_) | HitBtcFrame::ServerError(_) | HitBtcFrame::Unrecognized(_) => {
                return None
            }
        };
        sequence.map(|s| (symbol.as_str(), s))
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    }
}

fn sequence_of(params: &Value) -> Result<Option<u64>> {
    match params.get("sequence") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| AdapterError::malformed(format!("invalid sequence {}", value))),
    }
}

fn parse<T: serde::de::DeserializeOwned>(value: &Value, what: &str) -> Result<T> {
    T::deserialize(value).map_err(|e| AdapterError::malformed(format!("{}: {}", what, e)))
}

/// ISO 8601 timestamp to nanoseconds since epoch
pub fn timestamp_ns(raw: &str) -> Result<u64> {
    let dt = chrono::DateTime::parse_from_rfc3339(raw)
        .map_err(|e| AdapterError::malformed(format!("invalid timestamp {:?}: {}", raw, e)))?;
    let ns = dt
        .timestamp_nanos_opt()
        .ok_or_else(|| AdapterError::malformed(format!("timestamp out of range: {}", raw)))?;
    u64::try_from(ns).map_err(|_| AdapterError::malformed(format!("timestamp before epoch: {}", raw)))
}

fn ticker_frame(value: &Value, sequence: Option<u64>) -> Result<TickerFrame> {
    let raw: RawTicker = parse(value, "ticker")?;
    Ok(TickerFrame {
        timestamp: timestamp_ns(&raw.timestamp)?,
        symbol: raw.symbol,
        bid: raw.bid,
        ask: raw.ask,
        sequence,
    })
}

fn book_frame(value: &Value, sequence: Option<u64>) -> Result<BookFrame> {
    let raw: RawBook = parse(value, "orderbook")?;
    let timestamp = raw.timestamp.as_deref().map(timestamp_ns).transpose()?;
    let levels = |levels: Vec<RawLevel>| -> Vec<PriceLevel> {
        levels.into_iter().map(|l| (l.price, l.size)).collect()
    };
    Ok(BookFrame {
        symbol: raw.symbol,
        bid: levels(raw.bid),
        ask: levels(raw.ask),
        sequence,
        timestamp,
    })
}

fn trades_frame(value: &Value, sequence: Option<u64>) -> Result<TradesFrame> {
    let raw: RawTrades = parse(value, "trades")?;
    let trades = raw
        .data
        .into_iter()
        .map(|t| {
            Ok(TradeEntry {
                order_id: match t.id {
                    Value::String(s) => s,
                    other => other.to_string(),
                },
                side: t.side,
                price: t.price,
                amount: t.quantity,
                timestamp: timestamp_ns(&t.timestamp)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TradesFrame {
        symbol: raw.symbol,
        trades,
        sequence,
    })
}

/// HitBTC feed adapter: subscription, sequence checks, book replicas and event emission.
///
/// Owned by a single task together with its channel; no internal locking.
pub struct HitBtcFeed {
    symbols: SymbolMap,
    subscription: Subscription,
    sink: Arc<dyn EventSink>,
    guard: SequenceGuard,
    books: BookStore,
    state: FeedState,
    clock: Arc<dyn Clock>,
}

impl HitBtcFeed {
    /// Build a feed. Every subscribed symbol must have an exchange mapping.
    pub fn new(
        symbols: SymbolMap,
        subscription: Subscription,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        if subscription.is_empty() {
            return Err(AdapterError::Configuration(
                "HitBTC subscription is empty".to_string(),
            ));
        }
        for (channel, symbol) in subscription.pairs() {
            symbols.exchange_symbol(symbol).map_err(|e| {
                error!("HitBTC: cannot subscribe {} on {}: no exchange symbol", symbol, channel);
                e
            })?;
        }

        Ok(Self {
            symbols,
            subscription,
            sink,
            guard: SequenceGuard::new(),
            books: BookStore::new(),
            state: FeedState::Disconnected,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the wall clock used for receipt timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Book replicas, keyed by standardized symbol
    pub fn books(&self) -> &BookStore {
        &self.books
    }

    pub fn sequence_guard(&self) -> &SequenceGuard {
        &self.guard
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Subscribe frames for `connection_id`, one per (channel, symbol) pair
    pub fn subscription_frames(&self, connection_id: &str) -> Result<Vec<String>> {
        self.subscription
            .pairs()
            .map(|(channel, symbol)| {
                let exchange = self.symbols.exchange_symbol(symbol)?;
                let frame = serde_json::json!({
                    "method": channel.subscribe_method(),
                    "params": { "symbol": exchange },
                    "id": connection_id,
                });
                Ok(frame.to_string())
            })
            .collect()
    }

    /// Decode and apply one raw frame received at `receipt_ns`.
    ///
    /// Errors: `MalformedFrame` and `UnknownSymbol` leave all state untouched and are non-fatal to
    /// the caller; `SequenceGap` and `MissingSnapshot` require a resync; `SinkClosed` stops the
    /// feed.
    pub async fn handle_frame(&mut self, raw: &str, receipt_ns: u64) -> Result<()> {
        let frame = HitBtcFrame::decode(raw)?;

        if let Some((symbol, sequence)) = frame.sequence() {
            if let Err(e) = self.guard.check(symbol, sequence) {
                warn!("HitBTC: Missing sequence number detected for {}", symbol);
                return Err(e);
            }
        }

        match frame {
            HitBtcFrame::Ticker(ticker) => self.on_ticker(ticker, receipt_ns).await,
            HitBtcFrame::Snapshot(book) => self.on_snapshot(book, receipt_ns).await,
            HitBtcFrame::Update(book) => self.on_update(book, receipt_ns).await,
            HitBtcFrame::Trades(trades) => self.on_trades(trades, receipt_ns).await,
            HitBtcFrame::Result(msg) => {
                debug!("HitBTC: subscription acknowledged: {}", msg);
                Ok(())
            }
            HitBtcFrame::ServerError(msg) => {
                error!("HitBTC: Received error from server: {}", msg);
                Ok(())
            }
            HitBtcFrame::Unrecognized(what) => {
                warn!("HitBTC: Invalid message received ({}): {}", what, raw);
                Ok(())
            }
        }
    }

    fn confirm(&mut self, symbol: &str, sequence: Option<u64>) -> Result<()> {
        match sequence {
            Some(sequence) => self.guard.observe(symbol, sequence),
            None => Ok(()),
        }
    }

    async fn on_ticker(&mut self, frame: TickerFrame, receipt_ns: u64) -> Result<()> {
        let symbol = self.symbols.standard_symbol_lenient(&frame.symbol)?.to_string();
        self.confirm(&frame.symbol, frame.sequence)?;

        self.sink
            .on_ticker(Ticker {
                symbol,
                bid: frame.bid,
                ask: frame.ask,
                timestamp: frame.timestamp,
                receipt_timestamp: receipt_ns,
            })
            .await
    }

    async fn on_snapshot(&mut self, frame: BookFrame, receipt_ns: u64) -> Result<()> {
        let symbol = self.symbols.standard_symbol(&frame.symbol)?.to_string();
        self.confirm(&frame.symbol, frame.sequence)?;

        let book = self.books.snapshot(&symbol, frame.bid, frame.ask);
        let update = BookUpdate::snapshot(
            symbol.as_str(),
            frame.timestamp.unwrap_or(receipt_ns),
            receipt_ns,
        );
        self.sink.on_book(book, &update).await
    }

    async fn on_update(&mut self, frame: BookFrame, receipt_ns: u64) -> Result<()> {
        let symbol = self.symbols.standard_symbol_lenient(&frame.symbol)?.to_string();
        if self.books.get(&symbol).is_none() {
            return Err(AdapterError::MissingSnapshot { symbol });
        }
        self.confirm(&frame.symbol, frame.sequence)?;

        let (book, delta) = self.books.update(&symbol, frame.entries())?;
        let update = BookUpdate::incremental(
            symbol.as_str(),
            delta,
            frame.timestamp.unwrap_or(receipt_ns),
            receipt_ns,
        );
        self.sink.on_book(book, &update).await
    }

    async fn on_trades(&mut self, frame: TradesFrame, receipt_ns: u64) -> Result<()> {
        let symbol = self.symbols.standard_symbol_lenient(&frame.symbol)?.to_string();
        self.confirm(&frame.symbol, frame.sequence)?;

        for entry in frame.trades {
            self.sink
                .on_trade(Trade {
                    symbol: symbol.clone(),
                    side: entry.side,
                    price: entry.price,
                    amount: entry.amount,
                    order_id: entry.order_id,
                    timestamp: entry.timestamp,
                    receipt_timestamp: receipt_ns,
                })
                .await?;
        }
        Ok(())
    }

    async fn lose_connection(
        &mut self,
        channel: &mut dyn StreamingChannel,
        err: AdapterError,
    ) -> Result<()> {
        self.state = FeedState::ConnectionLost;
        channel.close().await;
        Err(err)
    }
}

#[async_trait]
impl ExchangeFeed for HitBtcFeed {
    fn exchange(&self) -> &'static str {
        "HITBTC"
    }

    fn state(&self) -> FeedState {
        self.state
    }

    async fn subscribe(&mut self, channel: &mut dyn StreamingChannel) -> Result<usize> {
        let frames = self.subscription_frames(channel.id())?;
        for frame in &frames {
            channel.write(frame).await?;
        }
        info!("HitBTC: {} subscribed to {} channel/symbol pairs", channel.id(), frames.len());
        Ok(frames.len())
    }

    async fn run(&mut self, channel: &mut dyn StreamingChannel) -> Result<()> {
        if !channel.is_open() {
            if let Err(e) = channel.open().await {
                self.state = FeedState::Disconnected;
                return Err(e.into());
            }
        }

        self.guard.reset();
        self.books.clear();
        self.state = FeedState::Subscribing;
        if let Err(e) = self.subscribe(channel).await {
            return self.lose_connection(channel, e).await;
        }
        self.state = FeedState::Streaming;

        loop {
            let raw = match channel.recv().await {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    info!("HitBTC: {} stream ended", channel.id());
                    let closed = ChannelError::closed(channel.id());
                    return self.lose_connection(channel, closed.into()).await;
                }
                Err(e) => {
                    error!("HitBTC: {} read failed: {}", channel.id(), e);
                    return self.lose_connection(channel, e.into()).await;
                }
            };

            let receipt_ns = self.clock.now_ns();
            match self.handle_frame(&raw, receipt_ns).await {
                Ok(()) => {}
                Err(AdapterError::MalformedFrame(reason)) => {
                    warn!("HitBTC: dropping malformed frame ({}): {}", reason, raw);
                }
                Err(AdapterError::UnknownSymbol(symbol)) => {
                    warn!("HitBTC: dropping frame for unmapped symbol {}", symbol);
                }
                Err(e) if e.requires_resync() => {
                    error!("HitBTC: {} resync required: {}", channel.id(), e);
                    self.state = FeedState::Gap;
                    channel.close().await;
                    return Err(e);
                }
                Err(e) => return self.lose_connection(channel, e).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decode_snapshot() {
        let raw = r#"{"jsonrpc":"2.0","method":"snapshotOrderbook","params":{"ask":[{"price":"0.054588","size":"0.245"}],"bid":[{"price":"0.054558","size":"0.500"}],"symbol":"ETHBTC","sequence":8073827,"timestamp":"2018-11-19T05:00:28.193Z"}}"#;

        match HitBtcFrame::decode(raw).unwrap() {
            HitBtcFrame::Snapshot(book) => {
                assert_eq!(book.symbol, "ETHBTC");
                assert_eq!(book.sequence, Some(8073827));
                assert_eq!(book.ask, vec![(dec!(0.054588), dec!(0.245))]);
                assert_eq!(book.timestamp, Some(1_542_603_628_193_000_000));
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_decode_ticker_via_channel_with_null_side() {
        let raw = r#"{"channel":"ticker","data":{"symbol":"BTCUSD","bid":null,"ask":"6400.10","timestamp":"2018-11-19T05:00:28.000Z"}}"#;

        match HitBtcFrame::decode(raw).unwrap() {
            HitBtcFrame::Ticker(ticker) => {
                assert_eq!(ticker.bid, None);
                assert_eq!(ticker.ask, Some(dec!(6400.10)));
                assert_eq!(ticker.sequence, None);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_decode_trades_keeps_per_entry_timestamps() {
        let raw = r#"{"method":"updateTrades","params":{"data":[{"id":54469813,"price":"0.054670","quantity":"0.183","side":"buy","timestamp":"2017-10-19T16:34:25.041Z"},{"id":54469814,"price":"0.054671","quantity":"1.000","side":"sell","timestamp":"2017-10-19T16:34:26.041Z"}],"symbol":"ETHBTC"}}"#;

        match HitBtcFrame::decode(raw).unwrap() {
            HitBtcFrame::Trades(frame) => {
                assert_eq!(frame.trades.len(), 2);
                assert_eq!(frame.trades[0].order_id, "54469813");
                assert_eq!(frame.trades[1].side, Side::Sell);
                assert_eq!(
                    frame.trades[1].timestamp - frame.trades[0].timestamp,
                    1_000_000_000
                );
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_decode_envelopes() {
        assert!(matches!(
            HitBtcFrame::decode(r#"{"jsonrpc":"2.0","result":true,"id":"x"}"#).unwrap(),
            HitBtcFrame::Result(_)
        ));
        assert!(matches!(
            HitBtcFrame::decode(r#"{"jsonrpc":"2.0","result":false,"id":"x"}"#).unwrap(),
            HitBtcFrame::ServerError(_)
        ));
        assert!(matches!(
            HitBtcFrame::decode(r#"{"error":{"code":2001,"message":"Symbol not found"},"id":"x"}"#)
                .unwrap(),
            HitBtcFrame::ServerError(_)
        ));
        assert!(matches!(
            HitBtcFrame::decode(r#"{"method":"candles","params":{}}"#).unwrap(),
            HitBtcFrame::Unrecognized(_)
        ));
    }

    #[test]
    fn test_decode_failures_are_malformed() {
        let cases = [
            "not json",
            r#"{"method":"updateOrderbook"}"#,
            r#"{"method":"updateOrderbook","params":{"symbol":"X","sequence":"abc"}}"#,
            r#"{"method":"updateOrderbook","params":{"symbol":"X","bid":[{"price":"x","size":"1"}]}}"#,
            r#"{"method":"ticker","params":{"symbol":"X","bid":"1","ask":"2","timestamp":"yesterday"}}"#,
        ];
        for raw in cases {
            assert!(
                matches!(HitBtcFrame::decode(raw), Err(AdapterError::MalformedFrame(_))),
                "{}",
                raw
            );
        }
    }
}
