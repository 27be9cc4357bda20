//! Binance Market Data Feed
//!
//! Streams `<symbol>@ticker` updates from the Binance WebSocket API.
//!
//! # Connection
//!
//! One raw stream connection per feed. Subscriptions are managed with
//! `SUBSCRIBE`/`UNSUBSCRIBE` requests on the open socket and re-issued after
//! every reconnect. Messages for symbols outside the subscription set are
//! dropped here, not in the session.
//!
//! # Reconnection
//!
//! A closed or silent socket is retried with linear backoff. Once attempts
//! are exhausted the feed emits `Terminated(MaxReconnectExceeded)` and stops.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use super::heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatState};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{DataFeed, FeedError, FeedEvent, FeedSink};
use crate::domain::market::Tick;
use crate::infrastructure::broker::binance::symbols;
use crate::infrastructure::metrics;

/// Default public market data endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://stream.binance.com:9443/ws";

const FEED_NAME: &str = "binance";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Venue symbol (`BTCUSDT`) → symbol as the subscriber spelled it.
type SubscriptionMap = Arc<RwLock<BTreeMap<String, String>>>;

// =============================================================================
// Configuration
// =============================================================================

/// Binance feed settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinanceFeedConfig {
    /// Raw stream endpoint.
    pub url: String,
    /// Reconnect backoff.
    pub reconnect: ReconnectConfig,
    /// Ping/pong liveness.
    pub heartbeat: HeartbeatConfig,
    /// Limit for opening the socket.
    pub connect_timeout: Duration,
}

impl Default for BinanceFeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl BinanceFeedConfig {
    /// Config for a given endpoint with default timings.
    #[must_use]
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

// =============================================================================
// Wire format
// =============================================================================

/// 24h rolling ticker payload (only the fields used).
#[derive(Debug, Deserialize)]
struct TickerPayload {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "c")]
    last_price: Decimal,
    #[serde(rename = "E", default)]
    event_time: Option<i64>,
    #[serde(rename = "v", default)]
    volume: Option<Decimal>,
    #[serde(rename = "o", default)]
    open: Option<Decimal>,
    #[serde(rename = "h", default)]
    high: Option<Decimal>,
    #[serde(rename = "l", default)]
    low: Option<Decimal>,
    #[serde(rename = "b", default)]
    bid: Option<Decimal>,
    #[serde(rename = "a", default)]
    ask: Option<Decimal>,
}

impl TickerPayload {
    fn into_tick(self, symbol: String) -> Tick {
        let timestamp = self
            .event_time
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);
        Tick {
            symbol,
            price: self.last_price,
            timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            bid: self.bid,
            ask: self.ask,
            volume: self.volume,
        }
    }
}

/// Extract ticks for subscribed symbols from one text frame.
///
/// Accepts a single ticker, an array of tickers, or a combined-stream
/// envelope; request acknowledgements and unknown payloads yield nothing.
fn parse_ticks(text: &str, subscriptions: &BTreeMap<String, String>) -> Vec<Tick> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring non-JSON frame");
            return Vec::new();
        }
    };

    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("data") {
            Some(serde_json::Value::Array(items)) => items,
            Some(data) => vec![data],
            None => vec![serde_json::Value::Object(map)],
        },
        _ => return Vec::new(),
    };

    items
        .into_iter()
        .filter(|item| item.get("s").is_some() && item.get("c").is_some())
        .filter_map(|item| match serde_json::from_value::<TickerPayload>(item) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed ticker");
                None
            }
        })
        .filter_map(|payload| {
            let symbol = subscriptions
                .get(&payload.symbol.to_ascii_uppercase())?
                .clone();
            Some(payload.into_tick(symbol))
        })
        .collect()
}

fn stream_name(venue_symbol: &str) -> String {
    format!("{}@ticker", venue_symbol.to_ascii_lowercase())
}

// =============================================================================
// Feed
// =============================================================================

struct Connection {
    token: CancellationToken,
    resync: mpsc::UnboundedSender<()>,
    handle: JoinHandle<()>,
}

/// Binance ticker feed.
pub struct BinanceFeed {
    config: BinanceFeedConfig,
    subscriptions: SubscriptionMap,
    connection: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for BinanceFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceFeed")
            .field("url", &self.config.url)
            .field("subscriptions", &*self.subscriptions.read())
            .finish_non_exhaustive()
    }
}

impl BinanceFeed {
    /// Create a feed; nothing is opened until `connect`.
    #[must_use]
    pub fn new(config: BinanceFeedConfig) -> Self {
        Self {
            config,
            subscriptions: Arc::new(RwLock::new(BTreeMap::new())),
            connection: Mutex::new(None),
        }
    }

    /// Symbols currently subscribed, as the subscriber spelled them.
    #[must_use]
    pub fn subscribed(&self) -> Vec<String> {
        self.subscriptions.read().values().cloned().collect()
    }

    async fn stop_connection(&self) {
        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            connection.token.cancel();
            let _ = connection.handle.await;
        }
    }
}

#[async_trait]
impl DataFeed for BinanceFeed {
    fn name(&self) -> &str {
        FEED_NAME
    }

    async fn connect(&self, sink: FeedSink) -> Result<(), FeedError> {
        self.stop_connection().await;

        let ws = open(&self.config.url, self.config.connect_timeout)
            .await
            .map_err(|message| FeedError::ConnectionError { message })?;
        tracing::info!(url = %self.config.url, "Binance stream connected");
        sink.send(FeedEvent::Connected).await;

        let token = CancellationToken::new();
        let (resync, resync_rx) = mpsc::unbounded_channel();
        let task = StreamTask {
            config: self.config.clone(),
            subscriptions: Arc::clone(&self.subscriptions),
            sink,
            token: token.clone(),
            resync: resync_rx,
            request_id: 0,
        };
        let handle = tokio::spawn(task.run(ws));

        *self.connection.lock() = Some(Connection {
            token,
            resync,
            handle,
        });
        Ok(())
    }

    async fn subscribe(&self, symbols: Vec<String>) -> Result<(), FeedError> {
        {
            let mut subscriptions = self.subscriptions.write();
            subscriptions.clear();
            for symbol in &symbols {
                subscriptions.insert(symbols::to_venue(symbol), symbol.clone());
            }
        }
        tracing::info!(symbols = ?symbols, "Binance subscription set replaced");

        if let Some(connection) = self.connection.lock().as_ref() {
            let _ = connection.resync.send(());
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.stop_connection().await;
        tracing::info!("Binance stream disconnected");
    }
}

async fn open(url: &str, limit: Duration) -> Result<WsStream, String> {
    match tokio::time::timeout(limit, connect_async(url)).await {
        Ok(Ok((ws, _))) => Ok(ws),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("connect timed out after {}ms", limit.as_millis())),
    }
}

// =============================================================================
// Connection task
// =============================================================================

enum Outcome {
    Shutdown,
    Closed(String),
}

struct StreamTask {
    config: BinanceFeedConfig,
    subscriptions: SubscriptionMap,
    sink: FeedSink,
    token: CancellationToken,
    resync: mpsc::UnboundedReceiver<()>,
    request_id: u64,
}

impl StreamTask {
    async fn run(mut self, mut ws: WsStream) {
        let mut policy = ReconnectPolicy::new(self.config.reconnect);

        loop {
            match self.pump(ws).await {
                Outcome::Shutdown => return,
                Outcome::Closed(reason) => {
                    tracing::warn!(reason = %reason, "Binance stream closed");
                }
            }
            if !self.sink.send(FeedEvent::Disconnected).await {
                return;
            }

            ws = loop {
                let Some(delay) = policy.next_delay() else {
                    tracing::error!(
                        attempts = policy.max_attempts(),
                        "Binance stream reconnection attempts exhausted"
                    );
                    self.sink
                        .send(FeedEvent::Terminated(FeedError::MaxReconnectExceeded {
                            attempts: policy.max_attempts(),
                        }))
                        .await;
                    return;
                };

                let attempt = policy.current_attempt();
                metrics::record_reconnect(FEED_NAME);
                tracing::info!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    "Reconnecting Binance stream"
                );
                if !self.sink.send(FeedEvent::Reconnecting { attempt }).await {
                    return;
                }

                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = self.token.cancelled() => return,
                }

                match open(&self.config.url, self.config.connect_timeout).await {
                    Ok(ws) => break ws,
                    Err(e) => tracing::warn!(attempt, error = %e, "Reconnect attempt failed"),
                }
            };

            policy.reset();
            tracing::info!("Binance stream reconnected");
            if !self.sink.send(FeedEvent::Connected).await {
                return;
            }
        }
    }

    /// Serve one socket until it closes or the feed shuts down.
    async fn pump(&mut self, ws: WsStream) -> Outcome {
        let (mut write, mut read) = ws.split();
        let mut active = BTreeSet::new();
        if let Err(e) = self.sync_subscriptions(&mut write, &mut active).await {
            return Outcome::Closed(e);
        }

        let mut heartbeat = HeartbeatState::new(self.config.heartbeat);
        let period = heartbeat.ping_interval();
        let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                () = self.token.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Outcome::Shutdown;
                }
                request = self.resync.recv() => {
                    if request.is_none() {
                        return Outcome::Shutdown;
                    }
                    if let Err(e) = self.sync_subscriptions(&mut write, &mut active).await {
                        return Outcome::Closed(e);
                    }
                }
                _ = ping.tick() => match heartbeat.on_tick() {
                    HeartbeatAction::SendPing => {
                        if let Err(e) = write.send(Message::Ping(Vec::<u8>::new().into())).await {
                            return Outcome::Closed(e.to_string());
                        }
                    }
                    HeartbeatAction::Timeout => return Outcome::Closed("heartbeat timeout".into()),
                },
                msg = read.next() => {
                    heartbeat.record_activity();
                    if let Some(outcome) = self.handle_frame(msg, &mut write).await {
                        return outcome;
                    }
                }
            }
        }
    }

    async fn handle_frame(
        &self,
        msg: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
        write: &mut WsWrite,
    ) -> Option<Outcome> {
        match msg {
            Some(Ok(Message::Text(text))) => {
                let ticks = parse_ticks(text.as_str(), &self.subscriptions.read());
                for tick in ticks {
                    if !self.sink.send(FeedEvent::Tick(tick)).await {
                        return Some(Outcome::Shutdown);
                    }
                }
                None
            }
            Some(Ok(Message::Ping(data))) => {
                let _ = write.send(Message::Pong(data)).await;
                None
            }
            Some(Ok(Message::Close(_))) => Some(Outcome::Closed("close frame".into())),
            Some(Err(e)) => Some(Outcome::Closed(e.to_string())),
            None => Some(Outcome::Closed("stream ended".into())),
            Some(Ok(_)) => None,
        }
    }

    /// Bring the socket's stream set in line with the subscription map.
    async fn sync_subscriptions(
        &mut self,
        write: &mut WsWrite,
        active: &mut BTreeSet<String>,
    ) -> Result<(), String> {
        let (desired, symbols): (BTreeSet<String>, Vec<String>) = {
            let subscriptions = self.subscriptions.read();
            (
                subscriptions.keys().map(|s| stream_name(s)).collect(),
                subscriptions.values().cloned().collect(),
            )
        };

        let removed: Vec<String> = active.difference(&desired).cloned().collect();
        let added: Vec<String> = desired.difference(active).cloned().collect();

        if !removed.is_empty() {
            self.send_request(write, "UNSUBSCRIBE", removed).await?;
        }
        if !added.is_empty() {
            self.send_request(write, "SUBSCRIBE", added).await?;
        }
        *active = desired;

        tracing::debug!(streams = active.len(), "Binance subscriptions in effect");
        self.sink.send(FeedEvent::Subscribed(symbols)).await;
        Ok(())
    }

    async fn send_request(
        &mut self,
        write: &mut WsWrite,
        method: &str,
        params: Vec<String>,
    ) -> Result<(), String> {
        self.request_id += 1;
        let request = serde_json::json!({
            "method": method,
            "params": params,
            "id": self.request_id,
        });
        write
            .send(Message::Text(request.to_string().into()))
            .await
            .map_err(|e| e.to_string())
    }
}
