//! Raw payload capture
//!
//! Channels hand every inbound and outbound payload to an optional [`RawDataSink`] before they
//! interpret it, so audit capture survives error responses. The sink is a constructor argument
//! of each channel; there is no shared default.

use async_trait::async_trait;
use bytes::Bytes;

/// Header pairs in the order the server sent them
pub type HeaderList = Vec<(String, String)>;

/// Direction and target of a captured payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawContext {
    /// Response read from an address. WebSocket inbound frames carry `headers: None`.
    Endpoint {
        /// Address that produced the payload
        address: String,
        /// Response headers, when the caller asked for them
        headers: Option<HeaderList>,
    },
    /// Payload written to an address
    Send {
        /// Destination address
        address: String,
    },
    /// Marker emitted before a WebSocket handshake
    Connect {
        /// Address being dialled
        address: String,
    },
}

impl RawContext {
    /// Address carried by any context variant
    pub fn address(&self) -> &str {
        match self {
            RawContext::Endpoint { address, .. }
            | RawContext::Send { address }
            | RawContext::Connect { address } => address,
        }
    }
}

/// One captured payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Raw bytes, absent for connect markers
    pub payload: Option<Bytes>,
    /// Capture time (ns since epoch)
    pub timestamp_ns: u64,
    /// Id of the channel that observed the payload
    pub connection_id: String,
    /// Direction and target
    pub context: RawContext,
}

/// Receiver of raw payloads.
///
/// `record_sync` is the required entry point because the blocking HTTP channel cannot await.
/// Async channels call `record`, which defaults to the synchronous form.
#[async_trait]
pub trait RawDataSink: Send + Sync {
    /// Capture without suspending
    fn record_sync(&self, record: RawRecord);

    /// Capture from an async channel
    async fn record(&self, record: RawRecord) {
        self.record_sync(record)
    }
}

/// Logs every record at trace level under the `raw` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRawSink;

impl RawDataSink for TracingRawSink {
    fn record_sync(&self, record: RawRecord) {
        let size = record.payload.as_ref().map_or(0, Bytes::len);
        match &record.context {
            RawContext::Endpoint { address, headers } => tracing::trace!(
                target: "raw",
                "{} <- {} ({} bytes, {} headers) at {}",
                record.connection_id,
                address,
                size,
                headers.as_ref().map_or(0, Vec::len),
                record.timestamp_ns
            ),
            RawContext::Send { address } => tracing::trace!(
                target: "raw",
                "{} -> {} ({} bytes) at {}",
                record.connection_id,
                address,
                size,
                record.timestamp_ns
            ),
            RawContext::Connect { address } => tracing::trace!(
                target: "raw",
                "{} connecting to {} at {}",
                record.connection_id,
                address,
                record.timestamp_ns
            ),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;

    #[tokio::test]
    async fn test_async_record_defaults_to_sync() {
        let sink = RecordingSink::default();
        sink.record(RawRecord {
            payload: Some(Bytes::from_static(b"{}")),
            timestamp_ns: 7,
            connection_id: "t.http.0".to_string(),
            context: RawContext::Send {
                address: "https://example.com".to_string(),
            },
        })
        .await;

        let records = sink.take();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].context.address(), "https://example.com");
    }
}
