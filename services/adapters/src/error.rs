//! Error types for the adapters module

use network::ChannelError;
use thiserror::Error;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Main error type for adapter operations
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Sequence numbers for a symbol are not consecutive; messages were lost
    #[error("Sequence gap for {symbol}: expected {expected}, got {actual}")]
    SequenceGap {
        /// Exchange symbol the gap was detected on
        symbol: String,
        /// Sequence that should have arrived
        expected: u64,
        /// Sequence that did arrive
        actual: u64,
    },

    /// Incremental book update arrived before any snapshot for the symbol
    #[error("Book update for {symbol} received before snapshot")]
    MissingSnapshot {
        /// Standardized symbol
        symbol: String,
    },

    /// Frame could not be decoded; dropped by the feed loop
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Exchange symbol has no standardized mapping
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    /// Transport failure from the underlying channel
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// JSON parsing error outside the frame decoder
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Downstream event sink stopped accepting events
    #[error("Event sink closed: {0}")]
    SinkClosed(String),

    /// Configuration error in adapter settings
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AdapterError {
    /// Shorthand for a malformed frame with a formatted reason
    pub fn malformed(reason: impl Into<String>) -> Self {
        AdapterError::MalformedFrame(reason.into())
    }

    /// Book state can no longer be trusted; a fresh snapshot is needed
    pub fn requires_resync(&self) -> bool {
        matches!(
            self,
            AdapterError::SequenceGap { .. } | AdapterError::MissingSnapshot { .. }
        )
    }

    /// Check if the supervisor should reconnect and try again
    pub fn is_recoverable(&self) -> bool {
        match self {
            AdapterError::SequenceGap { .. } | AdapterError::MissingSnapshot { .. } => true,
            AdapterError::Channel(e) => e.is_connection_closed() || e.is_retryable(),
            _ => false,
        }
    }

    /// Check if this error indicates a permanent failure
    pub fn is_permanent(&self) -> bool {
        match self {
            AdapterError::Configuration(_)
            | AdapterError::UnknownSymbol(_)
            | AdapterError::SinkClosed(_) => true,
            AdapterError::Channel(e) => e.is_permanent(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_requires_resync() {
        let gap = AdapterError::SequenceGap {
            symbol: "BTCUSD".to_string(),
            expected: 11,
            actual: 13,
        };
        assert!(gap.requires_resync());
        assert!(gap.is_recoverable());
        assert_eq!(
            gap.to_string(),
            "Sequence gap for BTCUSD: expected 11, got 13"
        );
    }

    #[test]
    fn test_channel_classification_passes_through() {
        let closed: AdapterError = ChannelError::closed("hitbtc.ws.0").into();
        assert!(closed.is_recoverable());
        assert!(!closed.requires_resync());

        let bad_address: AdapterError = ChannelError::Construction("ws://x".into()).into();
        assert!(bad_address.is_permanent());
        assert!(!bad_address.is_recoverable());
    }
}
