//! Per-symbol sequence continuity
//!
//! Exchanges that number their book frames expect `next == last + 1` for every symbol. Any other
//! value means frames were lost and the local replica can no longer be trusted.

use std::collections::HashMap;

use crate::{AdapterError, Result};

/// Last confirmed sequence number per exchange symbol
#[derive(Debug, Default)]
pub struct SequenceGuard {
    last: HashMap<String, u64>,
}

impl SequenceGuard {
    /// Empty guard; the first frame of each symbol sets its baseline
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify `sequence` follows the last confirmed value without recording it
    pub fn check(&self, symbol: &str, sequence: u64) -> Result<()> {
        match self.last.get(symbol) {
            Some(&last) if last.wrapping_add(1) != sequence => Err(AdapterError::SequenceGap {
                symbol: symbol.to_string(),
                expected: last.wrapping_add(1),
                actual: sequence,
            }),
            _ => Ok(()),
        }
    }

    /// Check and, when continuous, record `sequence` as the new baseline
    pub fn observe(&mut self, symbol: &str, sequence: u64) -> Result<()> {
        self.check(symbol, sequence)?;
        self.last.insert(symbol.to_string(), sequence);
        Ok(())
    }

    /// Last confirmed sequence for `symbol`
    pub fn last(&self, symbol: &str) -> Option<u64> {
        self.last.get(symbol).copied()
    }

    /// Forget every baseline (new subscription, fresh snapshots expected)
    pub fn reset(&mut self) {
        self.last.clear();
    }

    /// Number of symbols tracked
    pub fn len(&self) -> usize {
        self.last.len()
    }

    /// True when no symbol has a baseline
    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}
