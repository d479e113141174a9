//! Normalized events emitted by exchange adapters

use rust_decimal::Decimal;

use crate::side::{BookSide, Side};

/// A single `(price, size)` level. Size zero means the level was removed.
pub type PriceLevel = (Decimal, Decimal);

/// Discriminator for [`NormalizedEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EventKind {
    /// Best bid/ask update
    Ticker,
    /// Execution
    Trade,
    /// Level 2 book snapshot or delta
    L2Book,
}

/// Best bid / best ask for a symbol
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ticker {
    /// Standardized symbol (e.g. `BTC-USD`)
    pub symbol: String,
    /// Best bid, absent when the exchange reports an empty side
    pub bid: Option<Decimal>,
    /// Best ask, absent when the exchange reports an empty side
    pub ask: Option<Decimal>,
    /// Exchange event time (ns since epoch)
    pub timestamp: u64,
    /// Local receipt time (ns since epoch)
    pub receipt_timestamp: u64,
}

/// A single execution
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Trade {
    /// Standardized symbol
    pub symbol: String,
    /// Taker side
    pub side: Side,
    /// Execution price
    pub price: Decimal,
    /// Executed quantity
    pub amount: Decimal,
    /// Exchange trade identifier
    pub order_id: String,
    /// Exchange execution time (ns since epoch)
    pub timestamp: u64,
    /// Local receipt time (ns since epoch)
    pub receipt_timestamp: u64,
}

/// The literal per-level changes applied by one incremental book frame.
///
/// Entries are kept in exchange order. Size-zero entries are always present, even when the level
/// did not exist locally, so a downstream replica can replay exactly the same diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BookDelta {
    /// Bid side changes
    pub bid: Vec<PriceLevel>,
    /// Ask side changes
    pub ask: Vec<PriceLevel>,
}

impl BookDelta {
    /// Record one applied level
    pub fn push(&mut self, side: BookSide, price: Decimal, size: Decimal) {
        self.side_mut(side).push((price, size));
    }

    /// Entries for one side
    pub fn side(&self, side: BookSide) -> &[PriceLevel] {
        match side {
            BookSide::Bid => &self.bid,
            BookSide::Ask => &self.ask,
        }
    }

    fn side_mut(&mut self, side: BookSide) -> &mut Vec<PriceLevel> {
        match side {
            BookSide::Bid => &mut self.bid,
            BookSide::Ask => &mut self.ask,
        }
    }

    /// Total number of entries across both sides
    pub fn len(&self) -> usize {
        self.bid.len() + self.ask.len()
    }

    /// True when neither side carries an entry
    pub fn is_empty(&self) -> bool {
        self.bid.is_empty() && self.ask.is_empty()
    }
}

/// Order book event. `delta` is `None` for snapshots and `Some` for incremental updates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BookUpdate {
    /// Standardized symbol
    pub symbol: String,
    /// True when the whole book was replaced
    pub is_snapshot: bool,
    /// Applied levels for incremental updates
    pub delta: Option<BookDelta>,
    /// Exchange event time (ns since epoch)
    pub timestamp: u64,
    /// Local receipt time (ns since epoch)
    pub receipt_timestamp: u64,
}

impl BookUpdate {
    /// Snapshot event (no delta)
    pub fn snapshot(symbol: impl Into<String>, timestamp: u64, receipt_timestamp: u64) -> Self {
        Self {
            symbol: symbol.into(),
            is_snapshot: true,
            delta: None,
            timestamp,
            receipt_timestamp,
        }
    }

    /// Incremental event carrying the applied delta
    pub fn incremental(
        symbol: impl Into<String>,
        delta: BookDelta,
        timestamp: u64,
        receipt_timestamp: u64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            is_snapshot: false,
            delta: Some(delta),
            timestamp,
            receipt_timestamp,
        }
    }
}

/// Tagged union over every event an adapter can publish
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum NormalizedEvent {
    /// Best bid/ask
    Ticker(Ticker),
    /// Execution
    Trade(Trade),
    /// Book snapshot or delta
    BookUpdate(BookUpdate),
}

impl NormalizedEvent {
    /// Event discriminator
    pub fn kind(&self) -> EventKind {
        match self {
            NormalizedEvent::Ticker(_) => EventKind::Ticker,
            NormalizedEvent::Trade(_) => EventKind::Trade,
            NormalizedEvent::BookUpdate(_) => EventKind::L2Book,
        }
    }

    /// Standardized symbol the event refers to
    pub fn symbol(&self) -> &str {
        match self {
            NormalizedEvent::Ticker(t) => &t.symbol,
            NormalizedEvent::Trade(t) => &t.symbol,
            NormalizedEvent::BookUpdate(b) => &b.symbol,
        }
    }

    /// Local receipt time
    pub fn receipt_timestamp(&self) -> u64 {
        match self {
            NormalizedEvent::Ticker(t) => t.receipt_timestamp,
            NormalizedEvent::Trade(t) => t.receipt_timestamp,
            NormalizedEvent::BookUpdate(b) => b.receipt_timestamp,
        }
    }
}

impl From<Ticker> for NormalizedEvent {
    fn from(ticker: Ticker) -> Self {
        NormalizedEvent::Ticker(ticker)
    }
}

impl From<Trade> for NormalizedEvent {
    fn from(trade: Trade) -> Self {
        NormalizedEvent::Trade(trade)
    }
}

impl From<BookUpdate> for NormalizedEvent {
    fn from(update: BookUpdate) -> Self {
        NormalizedEvent::BookUpdate(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_delta_keeps_zero_sized_entries() {
        let mut delta = BookDelta::default();
        delta.push(BookSide::Bid, dec!(100), dec!(1));
        delta.push(BookSide::Ask, dec!(101), dec!(0));

        assert_eq!(delta.len(), 2);
        assert_eq!(delta.side(BookSide::Ask), &[(dec!(101), dec!(0))]);
    }

    #[test]
    fn test_event_accessors() {
        let event: NormalizedEvent = BookUpdate::snapshot("BTC-USD", 10, 20).into();
        assert_eq!(event.kind(), EventKind::L2Book);
        assert_eq!(event.symbol(), "BTC-USD");
        assert_eq!(event.receipt_timestamp(), 20);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = NormalizedEvent::Trade(Trade {
            symbol: "ETH-USD".to_string(),
            side: Side::Sell,
            price: dec!(2000.5),
            amount: dec!(0.25),
            order_id: "42".to_string(),
            timestamp: 1,
            receipt_timestamp: 2,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "trade");
        assert_eq!(json["side"], "sell");
    }
}
