//! Channel Layer
//!
//! Uniform connection contract shared by every exchange transport:
//!
//! ```text
//! Channel (lifecycle + identity)
//!   ├── HttpChannel       AsyncHttpChannel, Throttled<C>, Poller<C>
//!   └── StreamingChannel  WebSocketChannel
//! SyncHttpChannel         same contract as blocking inherent methods
//! ```
//!
//! Admission control and polling are decorators over any [`HttpChannel`], composed through
//! [`HttpChannelExt`] rather than separate channel types.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::identity::ConnectionIdentity;
use crate::raw::HeaderList;
use crate::Result;

pub mod http;
pub mod poll;
pub mod sync_http;
pub mod throttle;
pub mod websocket;

pub use http::AsyncHttpChannel;
pub use poll::Poller;
pub use sync_http::SyncHttpChannel;
pub use throttle::Throttled;
pub use websocket::WebSocketChannel;

/// Response headers worth surfacing in debug logs
pub(crate) const RATE_LIMIT_HEADERS: [&str; 2] = ["x-mbx-used-weight", "x-mbx-used-weight-1m"];

/// Lifecycle and identity common to all channels.
///
/// Channels start Closed. `open` on an Open channel and `close` on a Closed channel are no-ops.
#[async_trait]
pub trait Channel: Send {
    /// Id and traffic counters
    fn identity(&self) -> &ConnectionIdentity;

    /// Connection id
    fn id(&self) -> &str {
        &self.identity().id
    }

    /// True while an underlying session exists
    fn is_open(&self) -> bool;

    /// Create the underlying session
    async fn open(&mut self) -> Result<()>;

    /// Release the underlying session; the next `open` builds a fresh one
    async fn close(&mut self);
}

/// Request/response channel over HTTPS
#[async_trait]
pub trait HttpChannel: Channel {
    /// GET `request.address`. Auto-opens a Closed channel.
    async fn read(&mut self, request: &HttpRequest) -> Result<HttpReply>;

    /// POST `body` to `address` and return the response body. Auto-opens a Closed channel.
    async fn write(&mut self, address: &str, body: Bytes, headers: &[(String, String)])
        -> Result<Bytes>;
}

/// Persistent duplex text stream
#[async_trait]
pub trait StreamingChannel: Channel {
    /// Send one text frame. Fails with `ConnectionClosed` when Closed.
    async fn write(&mut self, message: &str) -> Result<()>;

    /// Next inbound text frame, `None` once the peer ends the stream
    async fn recv(&mut self) -> Result<Option<String>>;
}

/// GET request description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Target URL
    pub address: String,
    /// Extra request headers
    pub headers: HeaderList,
    /// Return response headers to the caller (and the raw sink)
    pub return_headers: bool,
    /// Rate-limit cost charged by [`Throttled`]
    pub weight: u32,
}

impl HttpRequest {
    /// Plain GET with weight 1
    pub fn get(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            headers: Vec::new(),
            return_headers: false,
            weight: 1,
        }
    }

    /// Add one request header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace all request headers
    pub fn headers(mut self, headers: HeaderList) -> Self {
        self.headers = headers;
        self
    }

    /// Ask for the response headers
    pub fn with_response_headers(mut self) -> Self {
        self.return_headers = true;
        self
    }

    /// Declared rate-limit weight
    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

/// Successful HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// Status code, always 2xx
    pub status: u16,
    /// Raw body
    pub body: Bytes,
    /// Response headers, present only when requested
    pub headers: Option<HeaderList>,
}

impl HttpReply {
    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Decorator constructors for any [`HttpChannel`]
pub trait HttpChannelExt: HttpChannel + Sized {
    /// Admission control with `limit` weight per wall-clock minute.
    ///
    /// `interval` is stored for reporting; buckets are always one minute wide.
    fn with_throttle(self, limit: u32, interval: Duration) -> Throttled<Self> {
        Throttled::new(self, limit, interval)
    }

    /// Repeated GET over `addresses`, pausing `sleep` between addresses and a further `delay`
    /// after each full cycle
    fn into_poller(
        self,
        addresses: Vec<String>,
        delay: Duration,
        sleep: Duration,
    ) -> Result<Poller<Self>> {
        Poller::new(self, addresses, delay, sleep)
    }
}

impl<C: HttpChannel> HttpChannelExt for C {}

pub(crate) fn collect_headers(headers: &reqwest::header::HeaderMap) -> HeaderList {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

pub(crate) fn log_rate_limit_usage(id: &str, headers: &HeaderList) {
    for (name, value) in headers {
        if RATE_LIMIT_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            tracing::debug!("{}: {}:{}", id, name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::get("https://api.hitbtc.com/api/2/public/symbol")
            .header("accept", "application/json")
            .with_response_headers()
            .weight(5);

        assert_eq!(request.headers.len(), 1);
        assert!(request.return_headers);
        assert_eq!(request.weight, 5);
    }

    #[test]
    fn test_reply_text_is_lossy() {
        let reply = HttpReply {
            status: 200,
            body: Bytes::from_static(b"ok\xff"),
            headers: None,
        };
        assert_eq!(reply.text(), "ok\u{fffd}");
    }
}
