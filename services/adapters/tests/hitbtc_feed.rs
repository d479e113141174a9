//! HitBTC feed driven end to end over a scripted streaming channel

use adapter_service::{
    AdapterError, ExchangeFeed, FeedChannel, FeedState, HitBtcFeed, MpscEventSink,
    NormalizedEvent, Subscription, SymbolMap,
};
use async_trait::async_trait;
use network::{
    Channel, ChannelError, Clock, ConnectionIdGenerator, ConnectionIdentity, StreamingChannel,
    TransportKind,
};
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};
use types::{BookSide, Side};

const RECEIPT_NS: u64 = 1_700_000_000_000_000_000;

struct FixedClock(u64);

impl Clock for FixedClock {
    fn now_ns(&self) -> u64 {
        self.0
    }
}

/// In-memory stream: replays `inbound` then reports end of stream
struct ScriptedChannel {
    identity: ConnectionIdentity,
    open: bool,
    fail_open: bool,
    inbound: VecDeque<String>,
    written: Vec<String>,
}

impl ScriptedChannel {
    fn new(frames: &[&str]) -> Self {
        let ids = ConnectionIdGenerator::new();
        Self {
            identity: ids.identity("hitbtc", TransportKind::Ws),
            open: false,
            fail_open: false,
            inbound: frames.iter().map(|f| f.to_string()).collect(),
            written: Vec::new(),
        }
    }

    fn push(&mut self, frames: &[&str]) {
        self.inbound.extend(frames.iter().map(|f| f.to_string()));
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn identity(&self) -> &ConnectionIdentity {
        &self.identity
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn open(&mut self) -> network::Result<()> {
        if self.open {
            return Ok(());
        }
        if self.fail_open {
            return Err(ChannelError::timeout("connect", 10));
        }
        self.open = true;
        self.identity.sessions_opened += 1;
        Ok(())
    }

    async fn close(&mut self) {
        self.open = false;
    }
}

#[async_trait]
impl StreamingChannel for ScriptedChannel {
    async fn write(&mut self, message: &str) -> network::Result<()> {
        if !self.open {
            return Err(ChannelError::closed(self.identity.id.clone()));
        }
        self.written.push(message.to_string());
        self.identity.sent += 1;
        Ok(())
    }

    async fn recv(&mut self) -> network::Result<Option<String>> {
        if !self.open {
            return Err(ChannelError::closed(self.identity.id.clone()));
        }
        let frame = self.inbound.pop_front();
        if frame.is_some() {
            self.identity.received += 1;
        }
        Ok(frame)
    }
}

fn symbols() -> SymbolMap {
    SymbolMap::from_pairs([("BTC-USD", "BTCUSD"), ("ETH-USD", "ETHUSD")])
}

fn book_subscription() -> Subscription {
    Subscription::new().with(FeedChannel::Orderbook, ["BTC-USD"])
}

fn feed_with(
    symbols: SymbolMap,
    subscription: Subscription,
) -> (HitBtcFeed, mpsc::Receiver<NormalizedEvent>) {
    let (sink, rx) = MpscEventSink::channel(64);
    let feed = HitBtcFeed::new(symbols, subscription, Arc::new(sink))
        .unwrap()
        .with_clock(Arc::new(FixedClock(RECEIPT_NS)));
    (feed, rx)
}

fn drain(rx: &mut mpsc::Receiver<NormalizedEvent>) -> Vec<NormalizedEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

const SNAPSHOT_SEQ_1: &str = r#"{"jsonrpc":"2.0","method":"snapshotOrderbook","params":{"ask":[{"price":"101","size":"2"}],"bid":[{"price":"100","size":"1"}],"symbol":"BTCUSD","sequence":1,"timestamp":"2018-11-19T05:00:28.193Z"}}"#;
const UPDATE_SEQ_2_REMOVE_ASK: &str = r#"{"jsonrpc":"2.0","method":"updateOrderbook","params":{"ask":[{"price":"101","size":"0"}],"bid":[],"symbol":"BTCUSD","sequence":2,"timestamp":"2018-11-19T05:00:28.700Z"}}"#;
const UPDATE_SEQ_3_ADD_BID: &str = r#"{"jsonrpc":"2.0","method":"updateOrderbook","params":{"ask":[],"bid":[{"price":"99","size":"5"}],"symbol":"BTCUSD","sequence":3,"timestamp":"2018-11-19T05:00:29.000Z"}}"#;

#[tokio::test]
async fn test_snapshot_then_removal_delta() {
    let mut channel = ScriptedChannel::new(&[SNAPSHOT_SEQ_1, UPDATE_SEQ_2_REMOVE_ASK]);
    let (mut feed, mut rx) = feed_with(symbols(), book_subscription());

    let err = assert_err!(feed.run(&mut channel).await);
    assert!(matches!(err, AdapterError::Channel(ref e) if e.is_connection_closed()));
    assert_eq!(feed.state(), FeedState::ConnectionLost);
    assert!(!channel.is_open());

    let book = feed.books().get("BTC-USD").unwrap();
    assert_eq!(book.levels(BookSide::Bid), vec![(dec!(100), dec!(1))]);
    assert!(book.levels(BookSide::Ask).is_empty());

    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
    match (&events[0], &events[1]) {
        (NormalizedEvent::BookUpdate(snapshot), NormalizedEvent::BookUpdate(update)) => {
            assert!(snapshot.is_snapshot);
            assert_eq!(snapshot.timestamp, 1_542_603_628_193_000_000);
            assert_eq!(snapshot.receipt_timestamp, RECEIPT_NS);

            assert!(!update.is_snapshot);
            let delta = update.delta.as_ref().unwrap();
            assert!(delta.bid.is_empty());
            assert_eq!(delta.ask, vec![(dec!(101), dec!(0))]);
        }
        other => panic!("unexpected events {:?}", other),
    }
}

#[tokio::test]
async fn test_subscribe_writes_one_frame_per_pair() {
    let subscription = Subscription::new()
        .with(FeedChannel::Trades, ["BTC-USD", "ETH-USD"])
        .with(FeedChannel::Ticker, ["BTC-USD"]);
    let (mut feed, _rx) = feed_with(symbols(), subscription);
    let mut channel = ScriptedChannel::new(&[]);
    assert_ok!(channel.open().await);

    let written = assert_ok!(feed.subscribe(&mut channel).await);
    assert_eq!(written, 3);
    assert_eq!(channel.written.len(), 3);

    let mut requests: Vec<(String, String)> = channel
        .written
        .iter()
        .map(|raw| {
            let frame: serde_json::Value = serde_json::from_str(raw).unwrap();
            assert_eq!(frame["id"], "hitbtc.ws.0");
            (
                frame["method"].as_str().unwrap().to_string(),
                frame["params"]["symbol"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    requests.sort();

    assert_eq!(
        requests,
        vec![
            ("subscribeTicker".to_string(), "BTCUSD".to_string()),
            ("subscribeTrades".to_string(), "BTCUSD".to_string()),
            ("subscribeTrades".to_string(), "ETHUSD".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_gap_leaves_book_untouched() {
    let mut channel = ScriptedChannel::new(&[SNAPSHOT_SEQ_1, UPDATE_SEQ_3_ADD_BID]);
    let (mut feed, mut rx) = feed_with(symbols(), book_subscription());

    let err = assert_err!(feed.run(&mut channel).await);
    match err {
        AdapterError::SequenceGap {
            symbol,
            expected,
            actual,
        } => {
            assert_eq!(symbol, "BTCUSD");
            assert_eq!(expected, 2);
            assert_eq!(actual, 3);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(feed.state(), FeedState::Gap);
    assert!(!channel.is_open());

    let book = feed.books().get("BTC-USD").unwrap();
    assert_eq!(book.size_at(BookSide::Bid, dec!(99)), None);
    assert_eq!(book.best_ask(), Some((dec!(101), dec!(2))));
    assert_eq!(feed.sequence_guard().last("BTCUSD"), Some(1));
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn test_update_before_snapshot_requires_resync() {
    let mut channel = ScriptedChannel::new(&[UPDATE_SEQ_2_REMOVE_ASK]);
    let (mut feed, mut rx) = feed_with(symbols(), book_subscription());

    let err = assert_err!(feed.run(&mut channel).await);
    assert!(matches!(err, AdapterError::MissingSnapshot { ref symbol } if symbol == "BTC-USD"));
    assert!(err.requires_resync());
    assert_eq!(feed.state(), FeedState::Gap);
    assert!(feed.sequence_guard().is_empty());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let mut channel = ScriptedChannel::new(&[
        "not json",
        r#"{"method":"updateOrderbook","params":{"symbol":"BTCUSD","sequence":"two"}}"#,
        SNAPSHOT_SEQ_1,
        r#"{"jsonrpc":"2.0","result":true,"id":"hitbtc.ws.0"}"#,
        r#"{"error":{"code":2001,"message":"Symbol not found"},"id":"hitbtc.ws.0"}"#,
        UPDATE_SEQ_2_REMOVE_ASK,
    ]);
    let (mut feed, mut rx) = feed_with(symbols(), book_subscription());

    assert_err!(feed.run(&mut channel).await);
    assert_eq!(feed.state(), FeedState::ConnectionLost);
    assert_eq!(feed.sequence_guard().last("BTCUSD"), Some(2));
    assert_eq!(drain(&mut rx).len(), 2);
}

#[tokio::test]
async fn test_trades_emit_one_event_per_execution() {
    let mut channel = ScriptedChannel::new(&[
        r#"{"jsonrpc":"2.0","method":"updateTrades","params":{"data":[{"id":1,"price":"100.5","quantity":"0.1","side":"buy","timestamp":"2018-11-19T05:00:28.000Z"},{"id":2,"price":"100.4","quantity":"0.2","side":"sell","timestamp":"2018-11-19T05:00:29.000Z"}],"symbol":"ETHUSD"}}"#,
    ]);
    let subscription = Subscription::new().with(FeedChannel::Trades, ["ETH-USD"]);
    let (mut feed, mut rx) = feed_with(symbols(), subscription);

    assert_err!(feed.run(&mut channel).await);

    let trades: Vec<_> = drain(&mut rx)
        .into_iter()
        .map(|event| match event {
            NormalizedEvent::Trade(trade) => trade,
            other => panic!("unexpected event {:?}", other),
        })
        .collect();
    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0].symbol, "ETH-USD");
    assert_eq!(trades[0].side, Side::Buy);
    assert_eq!(trades[1].amount, dec!(0.2));
    assert_eq!(trades[1].order_id, "2");
    assert_eq!(trades[1].timestamp - trades[0].timestamp, 1_000_000_000);
    assert!(trades.iter().all(|t| t.receipt_timestamp == RECEIPT_NS));
}

const UNMAPPED_TICKER: &str = r#"{"jsonrpc":"2.0","method":"ticker","params":{"ask":"0.5","bid":"0.4","symbol":"XRPUSD","timestamp":"2018-11-19T05:00:28.193Z"}}"#;

#[tokio::test]
async fn test_unmapped_symbol_passes_through_when_allowed() {
    let mut channel = ScriptedChannel::new(&[UNMAPPED_TICKER]);
    let (mut feed, mut rx) = feed_with(symbols().allow_missing(true), book_subscription());

    assert_err!(feed.run(&mut channel).await);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    match &events[0] {
        NormalizedEvent::Ticker(ticker) => {
            assert_eq!(ticker.symbol, "XRPUSD");
            assert_eq!(ticker.bid, Some(dec!(0.4)));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_unmapped_symbol_dropped_by_default() {
    let mut channel = ScriptedChannel::new(&[UNMAPPED_TICKER, SNAPSHOT_SEQ_1]);
    let (mut feed, mut rx) = feed_with(symbols(), book_subscription());

    assert_err!(feed.run(&mut channel).await);
    assert_eq!(feed.state(), FeedState::ConnectionLost);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].symbol(), "BTC-USD");
}

#[tokio::test]
async fn test_open_channel_is_not_reopened() {
    let mut channel = ScriptedChannel::new(&[SNAPSHOT_SEQ_1]);
    assert_ok!(channel.open().await);
    let (mut feed, _rx) = feed_with(symbols(), book_subscription());

    assert_err!(feed.run(&mut channel).await);
    assert_eq!(channel.identity().sessions_opened, 1);
    assert_eq!(channel.written.len(), 1);
}

#[tokio::test]
async fn test_each_session_starts_from_fresh_state() {
    let mut channel = ScriptedChannel::new(&[SNAPSHOT_SEQ_1, UPDATE_SEQ_2_REMOVE_ASK]);
    let (mut feed, mut rx) = feed_with(symbols(), book_subscription());

    assert_err!(feed.run(&mut channel).await);
    assert_eq!(feed.sequence_guard().last("BTCUSD"), Some(2));

    // Sequence numbering restarts on the new subscription
    channel.push(&[SNAPSHOT_SEQ_1]);
    assert_err!(feed.run(&mut channel).await);

    assert_eq!(channel.identity().sessions_opened, 2);
    assert_eq!(channel.written.len(), 2);
    assert_eq!(feed.sequence_guard().last("BTCUSD"), Some(1));
    assert_eq!(
        feed.books().get("BTC-USD").unwrap().best_ask(),
        Some((dec!(101), dec!(2)))
    );
    assert_eq!(drain(&mut rx).len(), 3);
}

#[tokio::test]
async fn test_failed_open_leaves_feed_disconnected() {
    let mut channel = ScriptedChannel::new(&[SNAPSHOT_SEQ_1]);
    channel.fail_open = true;
    let (mut feed, _rx) = feed_with(symbols(), book_subscription());

    let err = assert_err!(feed.run(&mut channel).await);
    assert!(matches!(err, AdapterError::Channel(ChannelError::Timeout { .. })));
    assert_eq!(feed.state(), FeedState::Disconnected);
    assert!(channel.written.is_empty());
}

#[tokio::test]
async fn test_closed_sink_stops_the_feed() {
    let mut channel = ScriptedChannel::new(&[SNAPSHOT_SEQ_1, UPDATE_SEQ_2_REMOVE_ASK]);
    let (mut feed, rx) = feed_with(symbols(), book_subscription());
    drop(rx);

    let err = assert_err!(feed.run(&mut channel).await);
    assert!(matches!(err, AdapterError::SinkClosed(_)));
    assert!(err.is_permanent());
    assert_eq!(feed.state(), FeedState::ConnectionLost);
    assert!(!channel.is_open());
}

#[test]
fn test_feed_rejects_unmapped_subscription() {
    let (sink, _rx) = MpscEventSink::channel(1);
    let subscription = Subscription::new().with(FeedChannel::Ticker, ["DOGE-USD"]);

    let result = HitBtcFeed::new(symbols(), subscription, Arc::new(sink));
    assert!(matches!(result, Err(AdapterError::UnknownSymbol(_))));

    let (sink, _rx) = MpscEventSink::channel(1);
    let result = HitBtcFeed::new(symbols(), Subscription::new(), Arc::new(sink));
    assert!(matches!(result, Err(AdapterError::Configuration(_))));
}
