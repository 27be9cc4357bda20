//! State Observer Binary
//!
//! Mirrors a running bot engine and logs a periodic state summary.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin state-observer
//! ```
//!
//! # Environment Variables
//!
//! ## Optional
//! - `OBSERVER_URL`: Engine observer stream (default: ws://127.0.0.1:8080/ws)
//! - `OBSERVER_RECONNECT_DELAY_SECS`: Fixed reconnect delay (default: 5)
//! - `OBSERVER_HEARTBEAT_TIMEOUT_SECS`: Silence before reconnecting, 0 disables (default: 15)
//! - `OBSERVER_LOG_CAPACITY`: System log ring size (default: 500)
//! - `OBSERVER_SUMMARY_INTERVAL_SECS`: Summary log period, 0 disables (default: 30)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use state_observer::infrastructure::telemetry;
use state_observer::{ObserverClient, ObserverConfig, ObserverStore, SharedStore};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    let config = ObserverConfig::from_env()?;
    tracing::info!(
        url = %config.url,
        reconnect_delay_secs = config.reconnect_delay.as_secs(),
        heartbeat_timeout_secs = config.heartbeat_timeout.map(|d| d.as_secs()),
        log_capacity = config.log_capacity,
        "Configuration loaded"
    );

    let store: SharedStore = Arc::new(Mutex::new(ObserverStore::with_history_capacity(
        config.log_capacity,
        config.order_history_capacity,
    )));
    let shutdown_token = CancellationToken::new();

    let summary = config
        .summary_interval
        .map(|period| spawn_summary(Arc::clone(&store), period, shutdown_token.clone()));
    let client = ObserverClient::new(config, Arc::clone(&store), shutdown_token.clone());
    let client_task = tokio::spawn(client.run());

    await_shutdown().await;
    shutdown_token.cancel();

    let drain = async {
        let _ = client_task.await;
        if let Some(summary) = summary {
            let _ = summary.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Graceful shutdown timed out"
        );
    }

    tracing::info!("State observer stopped");
    Ok(())
}

fn spawn_summary(store: SharedStore, period: Duration, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                () = token.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let summary = store.lock().summary();
            tracing::info!(
                status = %summary.status,
                positions = summary.positions,
                open_orders = summary.open_orders,
                bots = summary.bots,
                logs = summary.logs,
                realized_pnl = %summary.realized_pnl,
                unrealized_pnl = %summary.unrealized_pnl,
                "State summary"
            );
        }
    })
}

/// Load `.env` from the working directory or the nearest ancestor.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
