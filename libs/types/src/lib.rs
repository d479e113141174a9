//! # Normalized Market Data Types
//!
//! Venue-independent event model produced by the feed adapters. Every exchange adapter decodes
//! its own wire protocol and republishes one of three events:
//!
//! - [`Ticker`]: best bid / best ask
//! - [`Trade`]: a single execution
//! - [`BookUpdate`]: an order book snapshot or incremental delta
//!
//! ## Precision
//!
//! Prices and sizes are carried as [`rust_decimal::Decimal`] exactly as the exchange sent them.
//! No float conversion happens anywhere between the wire and the consumer.
//!
//! ## Timestamps
//!
//! All timestamps are nanoseconds since the Unix epoch. `timestamp` is the exchange-supplied
//! event time, `receipt_timestamp` is the local time the frame was read off the socket.
//!
//! ```rust
//! use rust_decimal_macros::dec;
//! use types::{BookDelta, BookSide};
//!
//! let mut delta = BookDelta::default();
//! delta.push(BookSide::Ask, dec!(101), dec!(0));
//! assert_eq!(delta.ask, vec![(dec!(101), dec!(0))]);
//! assert!(delta.bid.is_empty());
//! ```

pub mod events;
pub mod side;

pub use events::{BookDelta, BookUpdate, EventKind, NormalizedEvent, PriceLevel, Ticker, Trade};
pub use side::{BookSide, ParseSideError, Side};

pub use rust_decimal::Decimal;
