//! Order book replicas maintained from snapshots and deltas
//!
//! A replica never stores a zero-sized level. Deltas report every entry they were given,
//! including removals of levels that were not present locally, so a downstream consumer holding
//! its own replica can replay exactly the same diff.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use types::{BookDelta, BookSide, PriceLevel};

use crate::{AdapterError, Result};

/// Bid and ask price levels for one symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBookReplica {
    symbol: String,
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
}

impl OrderBookReplica {
    /// Empty book
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
        }
    }

    /// Standardized symbol
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Replace both sides wholesale. Zero-sized levels in the snapshot are ignored.
    pub fn replace<B, A>(&mut self, bids: B, asks: A)
    where
        B: IntoIterator<Item = PriceLevel>,
        A: IntoIterator<Item = PriceLevel>,
    {
        self.bids = bids.into_iter().filter(|(_, size)| !size.is_zero()).collect();
        self.asks = asks.into_iter().filter(|(_, size)| !size.is_zero()).collect();
    }

    /// Upsert (size > 0) or remove (size == 0) one level and record the entry in `delta`
    pub fn apply(&mut self, side: BookSide, price: Decimal, size: Decimal, delta: &mut BookDelta) {
        let levels = self.side_mut(side);
        if size.is_zero() {
            levels.remove(&price);
        } else {
            levels.insert(price, size);
        }
        delta.push(side, price, size);
    }

    /// Apply a batch of `(side, price, size)` entries in order, returning what was applied
    pub fn apply_delta<I>(&mut self, entries: I) -> BookDelta
    where
        I: IntoIterator<Item = (BookSide, Decimal, Decimal)>,
    {
        let mut delta = BookDelta::default();
        for (side, price, size) in entries {
            self.apply(side, price, size, &mut delta);
        }
        delta
    }

    /// Replay a delta produced by another replica
    pub fn replay(&mut self, delta: &BookDelta) {
        let mut scratch = BookDelta::default();
        for side in BookSide::ALL {
            for &(price, size) in delta.side(side) {
                self.apply(side, price, size, &mut scratch);
            }
        }
    }

    /// Bids, best (highest) first
    pub fn bids(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.bids.iter().rev().map(|(p, s)| (*p, *s))
    }

    /// Asks, best (lowest) first
    pub fn asks(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.asks.iter().map(|(p, s)| (*p, *s))
    }

    /// Levels of one side, best first
    pub fn levels(&self, side: BookSide) -> Vec<PriceLevel> {
        match side {
            BookSide::Bid => self.bids().collect(),
            BookSide::Ask => self.asks().collect(),
        }
    }

    /// Size resting at `price`, if any
    pub fn size_at(&self, side: BookSide, price: Decimal) -> Option<Decimal> {
        self.side_ref(side).get(&price).copied()
    }

    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids().next()
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks().next()
    }

    /// Number of levels on one side
    pub fn depth(&self, side: BookSide) -> usize {
        self.side_ref(side).len()
    }

    /// True when both sides are empty
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    fn side_ref(&self, side: BookSide) -> &BTreeMap<Decimal, Decimal> {
        match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        }
    }

    fn side_mut(&mut self, side: BookSide) -> &mut BTreeMap<Decimal, Decimal> {
        match side {
            BookSide::Bid => &mut self.bids,
            BookSide::Ask => &mut self.asks,
        }
    }
}

/// Replicas keyed by standardized symbol. A symbol exists only after its first snapshot.
#[derive(Debug, Default)]
pub struct BookStore {
    books: HashMap<String, OrderBookReplica>,
}

impl BookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace (or create) the replica for `symbol`
    pub fn snapshot<B, A>(&mut self, symbol: &str, bids: B, asks: A) -> &OrderBookReplica
    where
        B: IntoIterator<Item = PriceLevel>,
        A: IntoIterator<Item = PriceLevel>,
    {
        let book = self
            .books
            .entry(symbol.to_string())
            .or_insert_with(|| OrderBookReplica::new(symbol));
        book.replace(bids, asks);
        book
    }

    /// Apply incremental entries. Fails with `MissingSnapshot` when `symbol` has no replica yet.
    pub fn update<I>(&mut self, symbol: &str, entries: I) -> Result<(&OrderBookReplica, BookDelta)>
    where
        I: IntoIterator<Item = (BookSide, Decimal, Decimal)>,
    {
        let book = self
            .books
            .get_mut(symbol)
            .ok_or_else(|| AdapterError::MissingSnapshot {
                symbol: symbol.to_string(),
            })?;
        let delta = book.apply_delta(entries);
        Ok((&*book, delta))
    }

    pub fn get(&self, symbol: &str) -> Option<&OrderBookReplica> {
        self.books.get(symbol)
    }

    /// Drop every replica
    pub fn clear(&mut self) {
        self.books.clear();
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}
