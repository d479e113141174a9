//! Trade direction and book side enums

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Taker side of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Side {
    /// Taker bought
    Buy,
    /// Taker sold
    Sell,
}

/// Side of the order book a price level belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BookSide {
    /// Resting buy orders, best price is the highest
    Bid,
    /// Resting sell orders, best price is the lowest
    Ask,
}

impl BookSide {
    /// Both sides, bid first
    pub const ALL: [BookSide; 2] = [BookSide::Bid, BookSide::Ask];
}

/// Error returned when a side string is not recognised
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid side: {0}")]
pub struct ParseSideError(pub String);

impl FromStr for Side {
    type Err = ParseSideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" | "BUY" | "Buy" => Ok(Side::Buy),
            "sell" | "SELL" | "Sell" => Ok(Side::Sell),
            other => Err(ParseSideError(other.to_string())),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

impl fmt::Display for BookSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookSide::Bid => write!(f, "bid"),
            BookSide::Ask => write!(f, "ask"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_parsing() {
        assert_eq!("buy".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!("SELL".parse::<Side>().unwrap(), Side::Sell);
        assert_eq!(
            "hold".parse::<Side>(),
            Err(ParseSideError("hold".to_string()))
        );
    }

    #[test]
    fn test_display_round_trips_lowercase() {
        assert_eq!(Side::Sell.to_string(), "sell");
        assert_eq!(BookSide::Bid.to_string(), "bid");
    }
}
