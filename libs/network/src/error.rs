//! Channel Error Types
//!
//! Transport failures surfaced by every channel variant. Nothing in this crate retries: errors
//! bubble to the adapter and its supervisor, which own retry policy.

use thiserror::Error;

/// Main channel error type
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Read or write attempted on a channel that is not open
    #[error("Connection {id} is closed")]
    ConnectionClosed {
        /// Connection identifier
        id: String,
    },

    /// Non-2xx HTTP status. Raised after the raw payload was handed to the raw data sink.
    #[error("Connection {id}: {address} returned HTTP {status}")]
    TransportStatus {
        /// Connection identifier
        id: String,
        /// Requested address
        address: String,
        /// HTTP status code
        status: u16,
    },

    /// Invalid configuration detected while building a channel
    #[error("Invalid channel configuration: {0}")]
    Construction(String),

    /// HTTP client failure (DNS, TLS, connect, body decode)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket protocol or I/O failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Operation exceeded its deadline
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Deadline in milliseconds
        timeout_ms: u64,
    },

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for channel operations
pub type Result<T> = std::result::Result<T, ChannelError>;

impl ChannelError {
    /// Create a connection-closed error for the given connection id
    pub fn closed(id: impl Into<String>) -> Self {
        Self::ConnectionClosed { id: id.into() }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// True when the transport is unusable and the caller must reopen or reconnect
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, ChannelError::ConnectionClosed { .. })
    }

    /// Check if a policy layer may reasonably retry the same request
    pub fn is_retryable(&self) -> bool {
        match self {
            ChannelError::TransportStatus { .. }
            | ChannelError::Timeout { .. }
            | ChannelError::WebSocket(_)
            | ChannelError::Io(_) => true,
            ChannelError::Http(e) => e.is_timeout() || e.is_connect(),
            ChannelError::ConnectionClosed { .. } | ChannelError::Construction(_) => false,
        }
    }

    /// Check if this error indicates a permanent failure
    pub fn is_permanent(&self) -> bool {
        matches!(self, ChannelError::Construction(_))
    }
}
