//! Blocking HTTP channel
//!
//! Used for one-off REST calls made outside an async context (startup symbol fetch, scripts).
//! Must not be driven from inside a tokio runtime; wrap it in `spawn_blocking` there.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{collect_headers, log_rate_limit_usage, HttpReply, HttpRequest};
use crate::identity::ConnectionIdentity;
use crate::raw::{RawContext, RawDataSink, RawRecord};
use crate::time::{Clock, SystemClock};
use crate::{ChannelError, Result};

/// Blocking counterpart of [`super::AsyncHttpChannel`]. Captures through `record_sync`.
pub struct SyncHttpChannel {
    identity: ConnectionIdentity,
    client: Option<reqwest::blocking::Client>,
    timeout: Option<Duration>,
    raw_sink: Option<Arc<dyn RawDataSink>>,
    clock: Arc<dyn Clock>,
}

impl SyncHttpChannel {
    /// New Closed channel
    pub fn new(identity: ConnectionIdentity, raw_sink: Option<Arc<dyn RawDataSink>>) -> Self {
        Self {
            identity,
            client: None,
            timeout: None,
            raw_sink,
            clock: Arc::new(SystemClock),
        }
    }

    /// Per-request timeout applied to sessions opened after this call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Id and traffic counters
    pub fn identity(&self) -> &ConnectionIdentity {
        &self.identity
    }

    /// Connection id
    pub fn id(&self) -> &str {
        &self.identity.id
    }

    /// True while a client exists
    pub fn is_open(&self) -> bool {
        self.client.is_some()
    }

    /// Create the blocking client. No-op with a warning when already open.
    pub fn open(&mut self) -> Result<()> {
        if self.client.is_some() {
            warn!("{}: HTTP session already created", self.identity.id);
            return Ok(());
        }

        debug!("{}: create blocking HTTP session", self.identity.id);
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        self.client = Some(builder.build()?);
        self.identity.begin_session();
        Ok(())
    }

    /// Drop the client. No-op when already closed.
    pub fn close(&mut self) {
        if self.client.take().is_some() {
            info!("{}: closed HTTP session", self.identity.id);
        }
    }

    /// Blocking GET. Auto-opens a Closed channel.
    pub fn read(&mut self, request: &HttpRequest) -> Result<HttpReply> {
        let client = self.session("read")?;

        debug!("{}: requesting data from {}", self.identity.id, request.address);
        let mut builder = client.get(&request.address);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send()?;
        let status = response.status();
        let headers = collect_headers(response.headers());
        log_rate_limit_usage(&self.identity.id, &headers);

        let body = response.bytes()?;
        let now = self.clock.now_ns();
        self.identity.mark_received(now);

        let headers = request.return_headers.then_some(headers);
        self.capture(
            body.clone(),
            now,
            RawContext::Endpoint {
                address: request.address.clone(),
                headers: headers.clone(),
            },
        );

        self.check_status(&request.address, status)?;
        Ok(HttpReply {
            status: status.as_u16(),
            body,
            headers,
        })
    }

    /// Blocking POST. Auto-opens a Closed channel.
    pub fn write(
        &mut self,
        address: &str,
        body: Bytes,
        headers: &[(String, String)],
    ) -> Result<Bytes> {
        let client = self.session("write")?;

        debug!("{}: post to {}", self.identity.id, address);
        let mut builder = client.post(address).body(body);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send()?;
        self.identity.mark_sent();
        let status = response.status();
        let data = response.bytes()?;

        self.capture(
            data.clone(),
            self.clock.now_ns(),
            RawContext::Send {
                address: address.to_string(),
            },
        );

        self.check_status(address, status)?;
        Ok(data)
    }

    fn session(&mut self, operation: &str) -> Result<reqwest::blocking::Client> {
        if self.client.is_none() {
            info!("{}: auto-opening HTTP session for {}", self.identity.id, operation);
            self.open()?;
        }
        self.client
            .clone()
            .ok_or_else(|| ChannelError::closed(self.identity.id.clone()))
    }

    fn capture(&self, payload: Bytes, timestamp_ns: u64, context: RawContext) {
        if let Some(sink) = &self.raw_sink {
            sink.record_sync(RawRecord {
                payload: Some(payload),
                timestamp_ns,
                connection_id: self.identity.id.clone(),
                context,
            });
        }
    }

    fn check_status(&self, address: &str, status: reqwest::StatusCode) -> Result<()> {
        if status.is_success() {
            return Ok(());
        }
        warn!("{}: {} returned HTTP {}", self.identity.id, address, status);
        Err(ChannelError::TransportStatus {
            id: self.identity.id.clone(),
            address: address.to_string(),
            status: status.as_u16(),
        })
    }
}
