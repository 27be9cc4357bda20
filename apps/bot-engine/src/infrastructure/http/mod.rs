//! Observer and Health HTTP Server
//!
//! # Endpoints
//!
//! - `GET /ws` - Observer stream: `initial_state` then deltas, one JSON text
//!   frame per message
//! - `GET /state` - Current snapshot as JSON
//! - `GET /health` - JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (every session running)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::session::SessionHandle;
use crate::domain::sync::StateSnapshot;
use crate::infrastructure::broadcast::{CloseReason, ObserverSubscription, StateBroadcaster};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Engine version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Per-session state.
    pub sessions: Vec<SessionInfo>,
    /// Attached observers.
    pub observers: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every session running.
    Healthy,
    /// Some sessions stopped.
    Degraded,
    /// No session running.
    Unhealthy,
}

/// One session's liveness.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Bot name.
    pub bot_name: String,
    /// Whether the worker is still running.
    pub running: bool,
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the HTTP server.
pub struct HttpServerState {
    version: String,
    started_at: Instant,
    broadcaster: StateBroadcaster,
    sessions: Vec<SessionHandle>,
}

impl HttpServerState {
    /// Create server state.
    #[must_use]
    pub fn new(version: String, broadcaster: StateBroadcaster, sessions: Vec<SessionHandle>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            broadcaster,
            sessions,
        }
    }
}

// =============================================================================
// Server
// =============================================================================

/// Observer and health HTTP server.
pub struct HttpServer {
    port: u16,
    state: Arc<HttpServerState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HttpServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Bind to the configured port and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the server fails while
    /// running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    pub async fn serve(self, listener: TcpListener) -> Result<(), HealthServerError> {
        let local = listener
            .local_addr()
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;
        tracing::info!(addr = %local, "HTTP server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// All routes bound to `state`.
pub fn router(state: Arc<HttpServerState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/state", get(state_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// Observer Stream
// =============================================================================

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<HttpServerState>>,
) -> impl IntoResponse {
    let broadcaster = state.broadcaster.clone();
    ws.on_upgrade(move |socket| stream_to_observer(socket, broadcaster.attach()))
}

async fn stream_to_observer(mut socket: WebSocket, subscription: ObserverSubscription) {
    let observer = subscription.id();
    tracing::info!(observer, "Observer connected");

    let close = loop {
        tokio::select! {
            next = subscription.recv() => match next {
                Ok(message) => {
                    let text = match message.encode() {
                        Ok(text) => text,
                        Err(err) => {
                            tracing::error!(observer, error = %err, "Failed to encode sync message");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break None;
                    }
                }
                Err(reason) => break Some(reason),
            },
            incoming = socket.recv() => match incoming {
                None | Some(Err(_) | Ok(Message::Close(_))) => break None,
                Some(Ok(_)) => {}
            },
        }
    };

    if let Some(reason) = close {
        let (code, text) = match reason {
            CloseReason::Lagged => (close_code::POLICY, "observer lagged"),
            CloseReason::Shutdown => (close_code::AWAY, "server shutting down"),
        };
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: text.into(),
            })))
            .await;
    }
    tracing::info!(observer, reason = ?close, "Observer disconnected");
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn state_handler(State(state): State<Arc<HttpServerState>>) -> Json<StateSnapshot> {
    Json(state.broadcaster.snapshot())
}

async fn health_handler(State(state): State<Arc<HttpServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HttpServerState>>) -> impl IntoResponse {
    if state.sessions.iter().all(SessionHandle::is_running) {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &HttpServerState) -> HealthResponse {
    let sessions: Vec<SessionInfo> = state
        .sessions
        .iter()
        .map(|handle| SessionInfo {
            bot_name: handle.bot_name().to_string(),
            running: handle.is_running(),
        })
        .collect();

    HealthResponse {
        status: determine_health_status(&sessions),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        sessions,
        observers: state.broadcaster.observer_count(),
    }
}

fn determine_health_status(sessions: &[SessionInfo]) -> HealthStatus {
    let running = sessions.iter().filter(|s| s.running).count();
    match running {
        0 => HealthStatus::Unhealthy,
        n if n == sessions.len() => HealthStatus::Healthy,
        _ => HealthStatus::Degraded,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
