//! Asynchronous HTTP channel

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{collect_headers, log_rate_limit_usage, Channel, HttpChannel, HttpReply, HttpRequest};
use crate::identity::ConnectionIdentity;
use crate::raw::{RawContext, RawDataSink, RawRecord};
use crate::time::{Clock, SystemClock};
use crate::{ChannelError, Result};

/// HTTPS GET/POST over a pooled `reqwest` client.
///
/// The client is created on `open` and dropped on `close`. Reads and writes on a Closed channel
/// open it first; that transition is logged and counted in `sessions_opened`.
pub struct AsyncHttpChannel {
    identity: ConnectionIdentity,
    client: Option<reqwest::Client>,
    timeout: Option<Duration>,
    raw_sink: Option<Arc<dyn RawDataSink>>,
    clock: Arc<dyn Clock>,
}

impl AsyncHttpChannel {
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

    /// Replace the wall clock used for capture timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn session(&mut self, operation: &str) -> Result<reqwest::Client> {
        if self.client.is_none() {
            info!("{}: auto-opening HTTP session for {}", self.identity.id, operation);
            self.open().await?;
        }
        self.client
            .clone()
            .ok_or_else(|| ChannelError::closed(self.identity.id.clone()))
    }

    async fn capture(&self, payload: Bytes, timestamp_ns: u64, context: RawContext) {
        if let Some(sink) = &self.raw_sink {
            sink.record(RawRecord {
                payload: Some(payload),
                timestamp_ns,
                connection_id: self.identity.id.clone(),
                context,
            })
            .await;
        }
    }

    fn check_status(&self, address: &str, status: reqwest::StatusCode) -> Result<()> {
        if status.is_success() {
            Ok(())
        } else {
            warn!("{}: {} returned HTTP {}", self.identity.id, address, status);
            Err(ChannelError::TransportStatus {
                id: self.identity.id.clone(),
                address: address.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl Channel for AsyncHttpChannel {
    fn identity(&self) -> &ConnectionIdentity {
        &self.identity
    }

    fn is_open(&self) -> bool {
        self.client.is_some()
    }

    async fn open(&mut self) -> Result<()> {
        if self.client.is_some() {
            warn!("{}: HTTP session already created", self.identity.id);
            return Ok(());
        }

        debug!("{}: create HTTP session", self.identity.id);
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        self.client = Some(builder.build()?);
        self.identity.begin_session();
        Ok(())
    }

    async fn close(&mut self) {
        if self.client.take().is_some() {
            info!("{}: closed HTTP session", self.identity.id);
        }
    }
}

#[async_trait]
impl HttpChannel for AsyncHttpChannel {
    async fn read(&mut self, request: &HttpRequest) -> Result<HttpReply> {
        let client = self.session("read").await?;

        debug!("{}: requesting data from {}", self.identity.id, request.address);
        let mut builder = client.get(&request.address);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = collect_headers(response.headers());
        log_rate_limit_usage(&self.identity.id, &headers);

        let body = response.bytes().await?;
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
        )
        .await;

        self.check_status(&request.address, status)?;
        Ok(HttpReply {
            status: status.as_u16(),
            body,
            headers,
        })
    }

    async fn write(
        &mut self,
        address: &str,
        body: Bytes,
        headers: &[(String, String)],
    ) -> Result<Bytes> {
        let client = self.session("write").await?;

        debug!("{}: post to {}", self.identity.id, address);
        let mut builder = client.post(address).body(body);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        self.identity.mark_sent();
        let status = response.status();
        let data = response.bytes().await?;

        self.capture(
            data.clone(),
            self.clock.now_ns(),
            RawContext::Send {
                address: address.to_string(),
            },
        )
        .await;

        self.check_status(address, status)?;
        Ok(data)
    }
}
