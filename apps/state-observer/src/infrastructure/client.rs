//! Observer WebSocket Client
//!
//! Dials the engine's observer stream, folds every frame into the shared
//! [`ObserverStore`], and reconnects after a fixed delay when the socket
//! closes, errors, or goes silent for longer than the heartbeat timeout.
//!
//! ```text
//! ┌────────────┐ connect ┌───────────┐ initial_state ┌──────────┐
//! │ Connecting │────────▶│ Connected │──────────────▶│  deltas  │
//! └────────────┘         └───────────┘               └────┬─────┘
//!       ▲                                                 │ close / error / silence
//!       │ reconnect_delay  ┌──────────────┐               │
//!       └──────────────────│ Disconnected │◀──────────────┘
//!                          └──────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use bot_engine::domain::sync::SyncMessage;

use super::config::ObserverConfig;
use crate::domain::store::{ApplyOutcome, ObserverStore};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Frame = Option<Result<Message, tokio_tungstenite::tungstenite::Error>>;

/// Store shared between the client task and readers.
pub type SharedStore = Arc<Mutex<ObserverStore>>;

/// Why one connection ended.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObserverClientError {
    /// Handshake failed.
    #[error("connect to {url} failed: {reason}")]
    Connect {
        /// Target URL.
        url: String,
        /// Transport error text.
        reason: String,
    },

    /// Handshake did not finish in time.
    #[error("connect timed out after {}ms", .0.as_millis())]
    ConnectTimeout(Duration),

    /// No frame arrived within the heartbeat timeout.
    #[error("no frame received for {}ms", .0.as_millis())]
    HeartbeatTimeout(Duration),

    /// The engine sent a close frame.
    #[error("closed by engine with code {code}: {reason}")]
    Closed {
        /// WebSocket close code.
        code: u16,
        /// Close reason text.
        reason: String,
    },

    /// The socket ended without a close frame.
    #[error("stream ended")]
    StreamEnded,

    /// Read failed.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Reconnecting observer of one engine.
pub struct ObserverClient {
    config: ObserverConfig,
    store: SharedStore,
    token: CancellationToken,
}

impl ObserverClient {
    /// Client writing into `store` until `token` is cancelled.
    #[must_use]
    pub const fn new(config: ObserverConfig, store: SharedStore, token: CancellationToken) -> Self {
        Self {
            config,
            store,
            token,
        }
    }

    /// Handle to the store this client writes into.
    #[must_use]
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// Connect, serve and reconnect until cancelled.
    pub async fn run(self) {
        let mut connections: u64 = 0;

        while !self.token.is_cancelled() {
            self.store.lock().set_connecting();
            tracing::info!(url = %self.config.url, "Connecting to engine");

            let result = self.serve_once(&mut connections).await;
            self.store.lock().set_disconnected();

            match result {
                Ok(()) => break,
                Err(e) => tracing::warn!(
                    error = %e,
                    retry_in_ms = self.config.reconnect_delay.as_millis(),
                    "Observer connection lost"
                ),
            }

            tokio::select! {
                () = tokio::time::sleep(self.config.reconnect_delay) => {}
                () = self.token.cancelled() => break,
            }
        }

        tracing::info!(connections, "Observer client stopped");
    }

    /// One connection. `Ok` means the client was cancelled.
    async fn serve_once(&self, connections: &mut u64) -> Result<(), ObserverClientError> {
        let opened = tokio::select! {
            () = self.token.cancelled() => None,
            ws = self.open() => Some(ws?),
        };
        let Some(mut ws) = opened else {
            return Ok(());
        };

        *connections += 1;
        self.store.lock().set_connected();
        tracing::info!(url = %self.config.url, connection = *connections, "Connected to engine");

        loop {
            let frame = tokio::select! {
                () = self.token.cancelled() => None,
                frame = next_frame(&mut ws, self.config.heartbeat_timeout) => Some(frame?),
            };
            let Some(frame) = frame else {
                let _ = ws.close(None).await;
                return Ok(());
            };

            match frame {
                Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame.map_or((1005, String::new()), |f| {
                        (u16::from(f.code), f.reason.as_str().to_owned())
                    });
                    return Err(ObserverClientError::Closed { code, reason });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(ObserverClientError::Transport(e.to_string())),
                None => return Err(ObserverClientError::StreamEnded),
            }
        }
    }

    async fn open(&self) -> Result<WsStream, ObserverClientError> {
        let limit = self.config.connect_timeout;
        match tokio::time::timeout(limit, connect_async(self.config.url.as_str())).await {
            Ok(Ok((ws, _))) => Ok(ws),
            Ok(Err(e)) => Err(ObserverClientError::Connect {
                url: self.config.url.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(ObserverClientError::ConnectTimeout(limit)),
        }
    }

    fn handle_text(&self, text: &str) {
        let message = match SyncMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring undecodable frame");
                return;
            }
        };

        let event = message.event_name();
        if self.store.lock().apply(message) == ApplyOutcome::Applied {
            tracing::trace!(event, "Applied");
        }
    }
}

async fn next_frame(
    ws: &mut WsStream,
    limit: Option<Duration>,
) -> Result<Frame, ObserverClientError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, ws.next())
            .await
            .map_err(|_| ObserverClientError::HeartbeatTimeout(limit)),
        None => Ok(ws.next().await),
    }
}
