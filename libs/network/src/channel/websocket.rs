//! WebSocket streaming channel

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use super::{Channel, StreamingChannel};
use crate::identity::ConnectionIdentity;
use crate::raw::{RawContext, RawDataSink, RawRecord};
use crate::time::{Clock, SystemClock};
use crate::{ChannelError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Default handshake deadline
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Persistent duplex stream to a `wss://` endpoint.
///
/// Reads and writes on a Closed channel fail with `ConnectionClosed`; there is no auto-open.
pub struct WebSocketChannel {
    identity: ConnectionIdentity,
    address: String,
    connect_timeout: Duration,
    socket: Option<WsStream>,
    raw_sink: Option<Arc<dyn RawDataSink>>,
    clock: Arc<dyn Clock>,
}

impl WebSocketChannel {
    /// Validate `address` and build a Closed channel. Anything but a `wss` URL is rejected.
    pub fn new(
        address: impl Into<String>,
        identity: ConnectionIdentity,
        raw_sink: Option<Arc<dyn RawDataSink>>,
    ) -> Result<Self> {
        let address = address.into();
        let url = Url::parse(&address).map_err(|e| {
            ChannelError::Construction(format!("Invalid address {:?}: {}", address, e))
        })?;
        if url.scheme() != "wss" {
            return Err(ChannelError::Construction(format!(
                "Invalid address, must be a wss address. Provided address is: {:?}",
                address
            )));
        }

        Ok(Self {
            identity,
            address,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            socket: None,
            raw_sink,
            clock: Arc::new(SystemClock),
        })
    }

    /// Handshake deadline for subsequent `open` calls
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Replace the wall clock used for `last_message_time` and capture timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Adopt an already-handshaken socket as a new session
    #[cfg(test)]
    pub(crate) fn attach(&mut self, socket: WsStream) {
        self.socket = Some(socket);
        self.identity.begin_session();
    }

    /// Endpoint address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Inbound frames until the peer closes.
    ///
    /// Fails immediately when Closed. Each `open` allows a new stream; the first error is yielded
    /// and ends the stream. The stream borrows the channel mutably, so only the peer or a
    /// transport error can close it while the stream is alive.
    pub fn read(&mut self) -> Result<impl Stream<Item = Result<String>> + Send + '_> {
        if self.socket.is_none() {
            error!("{}: connection closed in read()", self.identity.id);
            return Err(ChannelError::closed(self.identity.id.clone()));
        }

        Ok(stream::unfold(Some(self), |channel| async move {
            let channel = channel?;
            match channel.recv_frame().await {
                Ok(Some(text)) => Some((Ok(text), Some(channel))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        }))
    }

    /// Sink and record to deliver, if a sink is attached
    fn raw_record(
        &self,
        payload: Option<Bytes>,
        timestamp_ns: u64,
        context: RawContext,
    ) -> Option<(Arc<dyn RawDataSink>, RawRecord)> {
        self.raw_sink.as_ref().map(|sink| {
            let record = RawRecord {
                payload,
                timestamp_ns,
                connection_id: self.identity.id.clone(),
                context,
            };
            (Arc::clone(sink), record)
        })
    }

    async fn recv_frame(&mut self) -> Result<Option<String>> {
        loop {
            let socket = match self.socket.as_mut() {
                Some(socket) => socket,
                None => return Err(ChannelError::closed(self.identity.id.clone())),
            };

            let payload = match socket.next().await {
                Some(Ok(Message::Text(text))) => text.into_bytes(),
                Some(Ok(Message::Binary(data))) => data,
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    info!("{}: server closed connection: {:?}", self.identity.id, frame);
                    self.socket = None;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    error!("{}: websocket error: {}", self.identity.id, e);
                    self.socket = None;
                    return Err(e.into());
                }
                None => {
                    info!("{}: websocket stream ended", self.identity.id);
                    self.socket = None;
                    return Ok(None);
                }
            };

            // Captured and counted even when it cannot be handed on as text
            let now = self.clock.now_ns();
            self.identity.mark_received(now);
            let capture = self.raw_record(
                Some(Bytes::from(payload.clone())),
                now,
                RawContext::Endpoint {
                    address: self.address.clone(),
                    headers: None,
                },
            );
            if let Some((sink, record)) = capture {
                sink.record(record).await;
            }

            match String::from_utf8(payload) {
                Ok(text) => return Ok(Some(text)),
                Err(_) => debug!("{}: skipping non UTF-8 binary frame", self.identity.id),
            }
        }
    }
}

#[async_trait]
impl Channel for WebSocketChannel {
    fn identity(&self) -> &ConnectionIdentity {
        &self.identity
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    async fn open(&mut self) -> Result<()> {
        if self.socket.is_some() {
            warn!("{}: websocket already open", self.identity.id);
            return Ok(());
        }

        info!("{}: connecting to {}", self.identity.id, self.address);
        let marker = self.raw_record(
            None,
            self.clock.now_ns(),
            RawContext::Connect {
                address: self.address.clone(),
            },
        );
        if let Some((sink, record)) = marker {
            sink.record(record).await;
        }

        match timeout(self.connect_timeout, connect_async(self.address.as_str())).await {
            Ok(Ok((socket, response))) => {
                info!(
                    "{}: connected with response: {:?}",
                    self.identity.id,
                    response.status()
                );
                self.socket = Some(socket);
                self.identity.begin_session();
                Ok(())
            }
            Ok(Err(e)) => {
                error!("{}: websocket connection error: {}", self.identity.id, e);
                Err(e.into())
            }
            Err(_) => {
                error!(
                    "{}: connection timeout after {:?}",
                    self.identity.id, self.connect_timeout
                );
                Err(ChannelError::timeout(
                    "websocket connect",
                    self.connect_timeout.as_millis() as u64,
                ))
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close(None).await {
                debug!("{}: close handshake failed: {}", self.identity.id, e);
            }
            info!("{}: closed connection", self.identity.id);
        }
    }
}

#[async_trait]
impl StreamingChannel for WebSocketChannel {
    async fn write(&mut self, message: &str) -> Result<()> {
        if self.socket.is_none() {
            error!("{}: connection closed in write()", self.identity.id);
            return Err(ChannelError::closed(self.identity.id.clone()));
        }

        let capture = self.raw_record(
            Some(Bytes::copy_from_slice(message.as_bytes())),
            self.clock.now_ns(),
            RawContext::Send {
                address: self.address.clone(),
            },
        );
        if let Some((sink, record)) = capture {
            sink.record(record).await;
        }

        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| ChannelError::closed(self.identity.id.clone()))?;
        socket.send(Message::Text(message.to_string())).await?;
        self.identity.mark_sent();
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        if self.socket.is_none() {
            return Err(ChannelError::closed(self.identity.id.clone()));
        }
        self.recv_frame().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::TransportKind;
    use std::sync::Mutex;
    use tokio::net::{TcpListener, TcpStream};

    fn identity() -> ConnectionIdentity {
        ConnectionIdentity::new("hitbtc.ws.0", TransportKind::Ws)
    }

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<RawRecord>>,
    }

    impl RecordingSink {
        fn records(&self) -> Vec<RawRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    impl RawDataSink for RecordingSink {
        fn record_sync(&self, record: RawRecord) {
            self.records.lock().unwrap().push(record);
        }
    }

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now_ns(&self) -> u64 {
            self.0
        }
    }

    /// Plain-TCP client socket to a local server that sends `frames`, echoes one message back
    /// and closes.
    async fn local_session(frames: Vec<Message>) -> WsStream {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut server = tokio_tungstenite::accept_async(tcp).await.unwrap();
            for frame in frames {
                server.send(frame).await.unwrap();
            }
            if let Some(Ok(message)) = server.next().await {
                server.send(message).await.unwrap();
            }
            let _ = server.close(None).await;
        });

        let tcp = TcpStream::connect(addr).await.unwrap();
        let (socket, _) =
            tokio_tungstenite::client_async(format!("ws://{}/ws", addr), MaybeTlsStream::Plain(tcp))
                .await
                .unwrap();
        socket
    }

    #[test]
    fn test_insecure_address_rejected_at_construction() {
        let err = WebSocketChannel::new("ws://api.hitbtc.com/api/2/ws", identity(), None)
            .err()
            .unwrap();
        assert!(err.is_permanent());

        assert!(WebSocketChannel::new("not a url", identity(), None).is_err());
        assert!(WebSocketChannel::new("wss://api.hitbtc.com/api/2/ws", identity(), None).is_ok());
    }

    #[tokio::test]
    async fn test_closed_channel_refuses_io() {
        let mut channel =
            WebSocketChannel::new("wss://api.hitbtc.com/api/2/ws", identity(), None).unwrap();

        assert!(!channel.is_open());
        assert!(channel.read().is_err());
        assert!(channel.write("{}").await.unwrap_err().is_connection_closed());
        assert!(channel.recv().await.unwrap_err().is_connection_closed());

        channel.close().await;
        assert_eq!(channel.identity().sessions_opened, 0);
    }

    #[tokio::test]
    async fn test_open_emits_connect_marker_before_handshake() {
        let sink = Arc::new(RecordingSink::default());
        let mut channel = WebSocketChannel::new(
            "wss://127.0.0.1:1/ws",
            identity(),
            Some(sink.clone() as Arc<dyn RawDataSink>),
        )
        .unwrap()
        .with_connect_timeout(Duration::from_secs(2));

        assert!(channel.open().await.is_err());
        assert!(!channel.is_open());
        assert_eq!(channel.identity().sessions_opened, 0);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload, None);
        assert_eq!(records[0].connection_id, "hitbtc.ws.0");
        assert_eq!(
            records[0].context,
            RawContext::Connect {
                address: "wss://127.0.0.1:1/ws".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_traffic_counters_and_capture() {
        let sink = Arc::new(RecordingSink::default());
        let mut channel = WebSocketChannel::new(
            "wss://api.hitbtc.com/api/2/ws",
            identity(),
            Some(sink.clone() as Arc<dyn RawDataSink>),
        )
        .unwrap()
        .with_clock(Arc::new(FixedClock(1_700_000_000_000_000_000)));

        let socket = local_session(vec![
            Message::Text("first".to_string()),
            Message::Binary(vec![0xff, 0xfe]),
        ])
        .await;
        channel.attach(socket);
        assert!(channel.is_open());
        assert_eq!(channel.identity().sessions_opened, 1);

        assert_eq!(channel.recv().await.unwrap().as_deref(), Some("first"));
        assert_eq!(channel.identity().received, 1);
        assert_eq!(channel.identity().last_message_time, 1_700_000_000_000_000_000);

        channel.write("echo").await.unwrap();
        assert_eq!(channel.identity().sent, 1);

        // Undecodable binary frame is skipped but still counted and captured
        assert_eq!(channel.recv().await.unwrap().as_deref(), Some("echo"));
        assert_eq!(channel.identity().received, 3);

        assert_eq!(channel.recv().await.unwrap(), None);
        assert!(!channel.is_open());

        let payloads: Vec<Option<Bytes>> = sink.records().into_iter().map(|r| r.payload).collect();
        assert_eq!(
            payloads,
            vec![
                Some(Bytes::from_static(b"first")),
                Some(Bytes::from_static(b"echo")),
                Some(Bytes::from_static(&[0xff, 0xfe])),
                Some(Bytes::from_static(b"echo")),
            ]
        );
        let contexts: Vec<RawContext> = sink.records().into_iter().map(|r| r.context).collect();
        assert!(matches!(contexts[1], RawContext::Send { .. }));
        assert!(matches!(contexts[2], RawContext::Endpoint { headers: None, .. }));
    }
}
