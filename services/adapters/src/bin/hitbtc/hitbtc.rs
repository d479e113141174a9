//! # HitBTC Collector
//!
//! ## Architecture
//!
//! ```text
//! REST /public/symbol ──► SymbolMap ──┐
//!                                     ▼
//! HitBTC WebSocket ──► HitBtcFeed ──► MpscEventSink ──► consumer task
//!                         │
//!                         └─ Gap / ConnectionLost ──► ReconnectPolicy ──► next session
//! ```
//!
//! - **Configuration-Driven**: TOML file (first argument) with `HITBTC_*` environment overrides
//! - **Fresh Books Per Session**: every reconnect resubscribes and waits for new snapshots
//! - **Bounded Retries**: consecutive failed sessions back off exponentially, then the process
//!   exits non-zero for external supervision to restart
//!
//! ```bash
//! RUST_LOG=info,raw=trace hitbtc --config hitbtc.toml
//! ```

use adapter_service::{
    ExchangeFeed, FeedConfig, FeedState, HitBtcFeed, MpscEventSink, NormalizedEvent,
    ReconnectPolicy, SymbolMap,
};
use anyhow::{Context, Result};
use clap::Parser;
use network::{
    AsyncHttpChannel, Channel, ConnectionIdGenerator, HttpChannel, HttpChannelExt, HttpRequest,
    RawDataSink, TracingRawSink, TransportKind, WebSocketChannel,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// HitBTC ticker, trade and order book collector
#[derive(Parser, Debug)]
#[command(name = "hitbtc", version, about)]
struct Args {
    /// TOML configuration file. Defaults plus environment overrides are used when it is missing.
    #[arg(short, long, default_value = "hitbtc.toml")]
    config: PathBuf,

    /// Capacity of the normalized event channel
    #[arg(long, default_value_t = 10_000)]
    buffer: usize,
}

fn load_config(path: &Path) -> Result<FeedConfig> {
    let config = if path.exists() {
        FeedConfig::from_toml_with_env_overrides(path)
            .with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        info!("📋 {} not found, using default configuration", path.display());
        let mut config = FeedConfig::default();
        config
            .apply_env_overrides(|key| std::env::var(key).ok())
            .context("Invalid environment override")?;
        config
    };

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Fetch the exchange symbol table through a throttled HTTP channel
async fn fetch_symbols(
    config: &FeedConfig,
    ids: &ConnectionIdGenerator,
    raw_sink: Option<Arc<dyn RawDataSink>>,
) -> Result<SymbolMap> {
    let identity = ids.identity(&config.websocket.connection_id_base, TransportKind::Http);
    let mut channel = AsyncHttpChannel::new(identity, raw_sink)
        .with_timeout(config.rest.request_timeout())
        .with_throttle(config.rest.throttle_limit, config.rest.throttle_interval());

    let reply = channel
        .read(&HttpRequest::get(&config.rest.symbols_url))
        .await
        .with_context(|| format!("Failed to fetch symbols from {}", config.rest.symbols_url))?;
    channel.close().await;

    let symbols = SymbolMap::from_hitbtc_symbols(&reply.text(), &config.symbols.separator)
        .context("Failed to parse HitBTC symbol table")?
        .allow_missing(config.symbols.allow_missing);
    Ok(symbols)
}

/// Drain normalized events until every sender is gone
async fn consume_events(mut events: mpsc::Receiver<NormalizedEvent>) -> u64 {
    let mut received = 0u64;
    while let Some(event) = events.recv().await {
        received += 1;
        debug!("{:?}", event);
        if received % 10_000 == 0 {
            info!("📊 {} events received", received);
        }
    }
    received
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args.config)?;

    info!("🚀 Starting HitBTC Collector");
    info!("   WebSocket: {}", config.websocket.url);
    info!("   Subscriptions: {} channel/symbol pairs", config.subscription.len());
    info!("   Raw capture: {}", config.raw_capture);

    let raw_sink: Option<Arc<dyn RawDataSink>> = config
        .raw_capture
        .then(|| Arc::new(TracingRawSink) as Arc<dyn RawDataSink>);
    let ids = ConnectionIdGenerator::new();

    let symbols = fetch_symbols(&config, &ids, raw_sink.clone()).await?;

    let (sink, events) = MpscEventSink::channel(args.buffer);
    let consumer = tokio::spawn(consume_events(events));

    let mut feed = HitBtcFeed::new(symbols, config.subscription.clone(), Arc::new(sink))
        .context("Failed to create HitBTC feed")?;

    let identity = ids.identity(&config.websocket.connection_id_base, TransportKind::Ws);
    let mut channel = WebSocketChannel::new(config.websocket.url.clone(), identity, raw_sink)
        .context("Failed to create WebSocket channel")?
        .with_connect_timeout(config.websocket.connect_timeout());

    let mut policy = ReconnectPolicy::new(config.reconnect);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let outcome = loop {
        let session = tokio::select! {
            result = feed.run(&mut channel) => Some(result),
            _ = &mut shutdown => None,
        };

        let Some(result) = session else {
            info!("📡 Received Ctrl+C, shutting down...");
            channel.close().await;
            break Ok(());
        };

        let err = match result {
            Ok(()) => continue,
            Err(e) => e,
        };

        if err.is_permanent() {
            error!("🔥 HitBTC feed failed permanently: {}", err);
            break Err(err).context("HitBTC feed stopped");
        }

        // Counters are only fresh when the session actually opened
        if feed.state() != FeedState::Disconnected && channel.identity().received > 0 {
            policy.reset();
        }

        let Some(backoff) = policy.next_backoff() else {
            error!(
                "🔥 CRASH: Exceeded maximum WebSocket connection attempts ({})",
                policy.max_attempts()
            );
            break Err(err).context("Max WebSocket connection attempts exceeded");
        };

        warn!(
            "{} ended in state {}: {}. Reconnecting in {:?} (attempt {}/{})",
            channel.id(),
            feed.state(),
            err,
            backoff,
            policy.attempts(),
            policy.max_attempts()
        );

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = &mut shutdown => {
                info!("📡 Received Ctrl+C, shutting down...");
                break Ok(());
            }
        }
    };

    drop(feed);
    match consumer.await {
        Ok(received) => info!("📊 Final stats: {} events received", received),
        Err(e) => warn!("Event consumer task failed: {}", e),
    }

    outcome
}
