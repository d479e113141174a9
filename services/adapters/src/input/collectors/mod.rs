//! Venue-specific data collectors

pub mod hitbtc;

pub use hitbtc::{HitBtcFeed, HitBtcFrame};
