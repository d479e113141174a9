//! Connection identity and id generation
//!
//! Every channel carries a [`ConnectionIdentity`]. Ids are minted by a [`ConnectionIdGenerator`]
//! that the owning process (or test fixture) creates and passes in, so two unrelated feeds never
//! share a counter.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Transport family a connection id is drawn for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Any of the HTTP channel variants
    Http,
    /// WebSocket streaming
    Ws,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Http => write!(f, "http"),
            TransportKind::Ws => write!(f, "ws"),
        }
    }
}

/// Mints `"{base}.{kind}.{n}"` ids with one monotonically increasing counter per transport kind.
///
/// Ids are unique only for the lifetime of one generator.
#[derive(Debug, Default)]
pub struct ConnectionIdGenerator {
    http: AtomicU64,
    ws: AtomicU64,
}

impl ConnectionIdGenerator {
    /// Fresh generator, both counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id for `kind`
    pub fn next_id(&self, base: &str, kind: TransportKind) -> String {
        let counter = match kind {
            TransportKind::Http => &self.http,
            TransportKind::Ws => &self.ws,
        };
        let n = counter.fetch_add(1, Ordering::Relaxed);
        format!("{}.{}.{}", base, kind, n)
    }

    /// Next id, wrapped in a fresh identity
    pub fn identity(&self, base: &str, kind: TransportKind) -> ConnectionIdentity {
        ConnectionIdentity::new(self.next_id(base, kind), kind)
    }
}

/// Id and traffic counters of one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionIdentity {
    /// Connection id, also used as the correlation id in subscription frames
    pub id: String,
    /// Transport family
    pub kind: TransportKind,
    /// Payloads written
    pub sent: u64,
    /// Payloads received
    pub received: u64,
    /// Wall-clock time of the last inbound payload (ns since epoch), 0 before the first
    pub last_message_time: u64,
    /// Underlying sessions created over the lifetime of the channel
    pub sessions_opened: u64,
}

impl ConnectionIdentity {
    /// Identity with zeroed counters
    pub fn new(id: impl Into<String>, kind: TransportKind) -> Self {
        Self {
            id: id.into(),
            kind,
            sent: 0,
            received: 0,
            last_message_time: 0,
            sessions_opened: 0,
        }
    }

    pub(crate) fn mark_received(&mut self, now_ns: u64) {
        self.received += 1;
        self.last_message_time = now_ns;
    }

    pub(crate) fn mark_sent(&mut self) {
        self.sent += 1;
    }

    /// Start of a new session: traffic counters reset, session count advances
    pub(crate) fn begin_session(&mut self) {
        self.sent = 0;
        self.received = 0;
        self.last_message_time = 0;
        self.sessions_opened += 1;
    }
}
