//! Exchange Transport Channels
//!
//! Uniform connection layer used by exchange adapters:
//!
//! - [`channel`]: `Channel` lifecycle contract plus HTTP (sync, async, throttled, polling) and
//!   WebSocket implementations
//! - [`identity`]: connection ids from an injected generator, traffic counters
//! - [`raw`]: optional raw payload capture
//! - [`time`]: wall-clock abstraction used for timestamps and throttle buckets
//!
//! Channels never retry. Every failure is returned as a [`ChannelError`] for the owning adapter or
//! its supervisor to act on.

pub mod channel;
pub mod error;
pub mod identity;
pub mod raw;
pub mod time;

pub use channel::{
    AsyncHttpChannel, Channel, HttpChannel, HttpChannelExt, HttpReply, HttpRequest, Poller,
    StreamingChannel, SyncHttpChannel, Throttled, WebSocketChannel,
};
pub use channel::throttle::ThrottleWindow;
pub use error::{ChannelError, Result};
pub use identity::{ConnectionIdGenerator, ConnectionIdentity, TransportKind};
pub use raw::{HeaderList, RawContext, RawDataSink, RawRecord, TracingRawSink};
pub use time::{safe_system_timestamp_ns, AnchoredClock, Clock, SystemClock};
