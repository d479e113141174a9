//! Standardized ↔ exchange symbol translation
//!
//! The table itself comes from outside (symbol discovery). [`SymbolMap::from_hitbtc_symbols`]
//! builds one from the HitBTC public symbol endpoint for the service binary.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

use crate::{AdapterError, Result};

/// Bidirectional symbol table plus per-symbol tick sizes
#[derive(Debug, Clone, Default)]
pub struct SymbolMap {
    to_exchange: HashMap<String, String>,
    to_standard: HashMap<String, String>,
    tick_sizes: HashMap<String, Decimal>,
    allow_missing: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HitBtcSymbol {
    id: String,
    base_currency: String,
    tick_size: Decimal,
}

impl SymbolMap {
    /// Empty table that rejects unknown symbols
    pub fn new() -> Self {
        Self::default()
    }

    /// Table from `(standard, exchange)` pairs
    pub fn from_pairs<I, S, E>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, E)>,
        S: Into<String>,
        E: Into<String>,
    {
        let mut map = Self::new();
        for (standard, exchange) in pairs {
            map.insert(standard, exchange);
        }
        map
    }

    /// Parse the `/api/2/public/symbol` payload.
    ///
    /// The exchange id is split after the base currency: `ETHBTC` with base `ETH` and separator
    /// `-` becomes `ETH-BTC`.
    pub fn from_hitbtc_symbols(payload: &str, separator: &str) -> Result<Self> {
        let symbols: Vec<HitBtcSymbol> = serde_json::from_str(payload)?;
        let mut map = Self::new();

        for symbol in symbols {
            let split = symbol.base_currency.len();
            if split == 0 || split >= symbol.id.len() || !symbol.id.is_char_boundary(split) {
                tracing::warn!(
                    "Skipping HitBTC symbol {} with base currency {:?}",
                    symbol.id,
                    symbol.base_currency
                );
                continue;
            }

            let (base, quote) = symbol.id.split_at(split);
            let standard = format!("{}{}{}", base, separator, quote);
            map.tick_sizes.insert(standard.clone(), symbol.tick_size);
            map.insert(standard, symbol.id);
        }

        tracing::info!("Loaded {} HitBTC symbols", map.len());
        Ok(map)
    }

    /// Pass unknown exchange symbols through unchanged where the caller permits it
    pub fn allow_missing(mut self, allow: bool) -> Self {
        self.allow_missing = allow;
        self
    }

    pub fn allows_missing(&self) -> bool {
        self.allow_missing
    }

    /// Add or replace one mapping
    pub fn insert(&mut self, standard: impl Into<String>, exchange: impl Into<String>) {
        let standard = standard.into();
        let exchange = exchange.into();
        self.to_standard.insert(exchange.clone(), standard.clone());
        self.to_exchange.insert(standard, exchange);
    }

    /// Exchange id for a standardized symbol
    pub fn exchange_symbol(&self, standard: &str) -> Result<&str> {
        self.to_exchange
            .get(standard)
            .map(String::as_str)
            .ok_or_else(|| AdapterError::UnknownSymbol(standard.to_string()))
    }

    /// Standardized symbol for an exchange id. Never passes through.
    pub fn standard_symbol(&self, exchange: &str) -> Result<&str> {
        self.to_standard
            .get(exchange)
            .map(String::as_str)
            .ok_or_else(|| AdapterError::UnknownSymbol(exchange.to_string()))
    }

    /// Standardized symbol, or the exchange id itself when unknown and pass-through is enabled
    pub fn standard_symbol_lenient<'a>(&'a self, exchange: &'a str) -> Result<&'a str> {
        match self.to_standard.get(exchange) {
            Some(standard) => Ok(standard.as_str()),
            None if self.allow_missing => Ok(exchange),
            None => Err(AdapterError::UnknownSymbol(exchange.to_string())),
        }
    }

    /// Minimum price increment, when the source provided one
    pub fn tick_size(&self, standard: &str) -> Option<Decimal> {
        self.tick_sizes.get(standard).copied()
    }

    pub fn len(&self) -> usize {
        self.to_exchange.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_exchange.is_empty()
    }
}
