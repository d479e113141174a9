//! Fixed-window admission control for HTTP reads
//!
//! Exchanges publish REST limits as integer weight per wall-clock minute. Each read adds its
//! declared weight to the current bucket; once the bucket reaches `limit` the read waits for the
//! next minute boundary and starts a fresh bucket with its own weight.
//!
//! A read just under the limit followed by one in the next bucket is not penalized, so bursts
//! at a boundary are possible.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{Channel, HttpChannel, HttpReply, HttpRequest};
use crate::identity::ConnectionIdentity;
use crate::time::{next_minute_boundary_ns, Clock, SystemClock};
use crate::Result;

/// Weight accounting for the current minute bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleWindow {
    /// Weight allowed per bucket
    pub limit: u32,
    /// Weight charged to the current bucket
    pub used_weight: u32,
    /// End of the current bucket (ns since epoch), `None` before the first read
    pub window_end: Option<u64>,
}

impl ThrottleWindow {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            used_weight: 0,
            window_end: None,
        }
    }

    /// Charge `weight` at `now_ns`. Returns how long the caller must wait before the window
    /// has to be restarted with [`ThrottleWindow::restart`].
    fn charge(&mut self, weight: u32, now_ns: u64) -> Option<Duration> {
        self.used_weight = self.used_weight.saturating_add(weight);

        let window_end = *self
            .window_end
            .get_or_insert_with(|| next_minute_boundary_ns(now_ns));

        if now_ns > window_end {
            debug!("Reset expired throttle");
            self.restart(weight, now_ns);
        }

        if self.used_weight >= self.limit {
            let end = self.window_end.unwrap_or(window_end);
            return Some(Duration::from_nanos(end.saturating_sub(now_ns)));
        }
        None
    }

    fn restart(&mut self, weight: u32, now_ns: u64) {
        self.window_end = Some(next_minute_boundary_ns(now_ns));
        self.used_weight = weight;
    }
}

/// Admission-control decorator over any [`HttpChannel`].
///
/// Only `read` is throttled; `write` goes straight to the inner channel.
pub struct Throttled<C> {
    inner: C,
    window: ThrottleWindow,
    interval: Duration,
    clock: Arc<dyn Clock>,
}

impl<C: HttpChannel> Throttled<C> {
    /// Wrap `inner` with `limit` weight per wall-clock minute
    pub fn new(inner: C, limit: u32, interval: Duration) -> Self {
        Self::with_clock(inner, limit, interval, Arc::new(SystemClock))
    }

    /// Same as [`Throttled::new`] with an explicit wall clock
    pub fn with_clock(inner: C, limit: u32, interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            window: ThrottleWindow::new(limit),
            interval,
            clock,
        }
    }

    /// Current bucket state
    pub fn window(&self) -> ThrottleWindow {
        self.window
    }

    /// Configured interval. Reported only; buckets are one minute wide.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wrapped channel
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Wrapped channel, mutably
    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    /// Unwrap the decorator
    pub fn into_inner(self) -> C {
        self.inner
    }

    async fn admit(&mut self, request: &HttpRequest) {
        let now = self.clock.now_ns();
        if let Some(wait) = self.window.charge(request.weight, now) {
            info!(
                "Throttling kicked in for {}, will wait {:?}",
                request.address, wait
            );
            tokio::time::sleep(wait).await;
            self.window.restart(request.weight, self.clock.now_ns());
        }
    }
}

#[async_trait]
impl<C: HttpChannel> Channel for Throttled<C> {
    fn identity(&self) -> &ConnectionIdentity {
        self.inner.identity()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    async fn open(&mut self) -> Result<()> {
        self.inner.open().await
    }

    async fn close(&mut self) {
        self.inner.close().await
    }
}

#[async_trait]
impl<C: HttpChannel> HttpChannel for Throttled<C> {
    async fn read(&mut self, request: &HttpRequest) -> Result<HttpReply> {
        self.admit(request).await;
        self.inner.read(request).await
    }

    async fn write(
        &mut self,
        address: &str,
        body: Bytes,
        headers: &[(String, String)],
    ) -> Result<Bytes> {
        self.inner.write(address, body, headers).await
    }
}
