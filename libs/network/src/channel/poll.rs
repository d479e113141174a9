//! Repeated GET over a fixed address list

use async_trait::async_trait;
use futures::stream::{self, Stream};
use std::time::Duration;
use tracing::{debug, error};

use super::{Channel, HttpChannel, HttpRequest};
use crate::identity::ConnectionIdentity;
use crate::raw::HeaderList;
use crate::{ChannelError, Result};

/// Polling decorator over any [`HttpChannel`].
///
/// Unlike single-shot reads, polling never reopens a Closed channel: the stream fails with
/// `ConnectionClosed` and the owner has to open the channel again explicitly.
pub struct Poller<C> {
    inner: C,
    addresses: Vec<String>,
    delay: Duration,
    sleep: Duration,
}

struct PollState<'a, C> {
    inner: &'a mut C,
    addresses: &'a [String],
    headers: HeaderList,
    sleep: Duration,
    delay: Duration,
    next: usize,
    pause: Option<Duration>,
    finished: bool,
}

impl<C: HttpChannel> Poller<C> {
    /// Poll `addresses` in order. At least one address is required.
    pub fn new(inner: C, addresses: Vec<String>, delay: Duration, sleep: Duration) -> Result<Self> {
        if addresses.is_empty() {
            return Err(ChannelError::Construction(format!(
                "{}: poller needs at least one address",
                inner.id()
            )));
        }
        Ok(Self {
            inner,
            addresses,
            delay,
            sleep,
        })
    }

    /// Polled addresses
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Wrapped channel
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Wrapped channel, mutably
    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    /// Infinite stream of response bodies.
    ///
    /// Sleeps `sleep` after every body and an extra `delay` after each full cycle. The first error
    /// (including a Closed channel observed before a GET) is yielded and ends the stream. The
    /// stream borrows the poller mutably, so the open check only fails for a channel that was
    /// already Closed when polling started.
    pub fn read(&mut self, headers: HeaderList) -> impl Stream<Item = Result<String>> + Send + '_ {
        let state = PollState {
            inner: &mut self.inner,
            addresses: &self.addresses,
            headers,
            sleep: self.sleep,
            delay: self.delay,
            next: 0,
            pause: None,
            finished: false,
        };

        stream::unfold(state, |mut state| async move {
            if state.finished {
                return None;
            }
            if let Some(pause) = state.pause.take() {
                tokio::time::sleep(pause).await;
            }

            let addresses = state.addresses;
            let address = &addresses[state.next];
            if !state.inner.is_open() {
                error!("{}: connection closed in read()", state.inner.id());
                state.finished = true;
                let err = ChannelError::closed(state.inner.id());
                return Some((Err(err), state));
            }

            debug!("{}: polling {}", state.inner.id(), address);
            let request = HttpRequest::get(address.as_str()).headers(state.headers.clone());
            match state.inner.read(&request).await {
                Ok(reply) => {
                    state.next += 1;
                    let mut pause = state.sleep;
                    if state.next == state.addresses.len() {
                        state.next = 0;
                        pause += state.delay;
                    }
                    state.pause = Some(pause);
                    Some((Ok(reply.text()), state))
                }
                Err(e) => {
                    state.finished = true;
                    Some((Err(e), state))
                }
            }
        })
    }
}

#[async_trait]
impl<C: HttpChannel> Channel for Poller<C> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{HttpChannelExt, HttpReply};
    use crate::identity::TransportKind;
    use bytes::Bytes;
    use futures::StreamExt;
    use tokio::time::Instant;

    /// Answers every GET with its own address, without I/O
    struct EchoChannel {
        identity: ConnectionIdentity,
        open: bool,
    }

    impl EchoChannel {
        fn new(open: bool) -> Self {
            Self {
                identity: ConnectionIdentity::new("stub.http.0", TransportKind::Http),
                open,
            }
        }
    }

    #[async_trait]
    impl Channel for EchoChannel {
        fn identity(&self) -> &ConnectionIdentity {
            &self.identity
        }

        fn is_open(&self) -> bool {
            self.open
        }

        async fn open(&mut self) -> Result<()> {
            self.open = true;
            Ok(())
        }

        async fn close(&mut self) {
            self.open = false;
        }
    }

    #[async_trait]
    impl HttpChannel for EchoChannel {
        async fn read(&mut self, request: &HttpRequest) -> Result<HttpReply> {
            Ok(HttpReply {
                status: 200,
                body: Bytes::from(request.address.clone()),
                headers: None,
            })
        }

        async fn write(&mut self, _: &str, body: Bytes, _: &[(String, String)]) -> Result<Bytes> {
            Ok(body)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_between_addresses_and_delay_after_cycle() {
        let mut poller = EchoChannel::new(true)
            .into_poller(
                vec!["a".to_string(), "b".to_string()],
                Duration::from_secs(10),
                Duration::from_secs(1),
            )
            .unwrap();

        let start = Instant::now();
        let yields: Vec<(String, u64)> = poller
            .read(Vec::new())
            .take(5)
            .map(|body| (body.unwrap(), start.elapsed().as_secs()))
            .collect()
            .await;

        assert_eq!(
            yields,
            vec![
                ("a".to_string(), 0),
                ("b".to_string(), 1),
                ("a".to_string(), 12),
                ("b".to_string(), 13),
                ("a".to_string(), 24),
            ]
        );
    }

    #[tokio::test]
    async fn test_closed_channel_ends_stream() {
        let mut poller = EchoChannel::new(false)
            .into_poller(vec!["a".to_string()], Duration::ZERO, Duration::ZERO)
            .unwrap();

        let items: Vec<Result<String>> = poller.read(Vec::new()).collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].as_ref().unwrap_err().is_connection_closed());
    }

    #[test]
    fn test_empty_address_list_rejected() {
        let poller = Poller::new(
            EchoChannel::new(true),
            Vec::new(),
            Duration::ZERO,
            Duration::ZERO,
        );
        assert!(poller.is_err());
    }
}
