//! Bot Engine Binary
//!
//! Runs one bot session and serves its state to observers.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin bot-engine
//! ```
//!
//! # Environment Variables
//!
//! ## Optional
//! - `BOT_NAME`, `BOT_STRATEGY`, `BOT_SYMBOLS`: Bot identity (default: bot-crypto, Manual, BTC/USD)
//! - `BROKER`: simulated | binance (default: simulated)
//! - `TRADING_MODE`: paper | live (default: paper)
//! - `BINANCE_API_KEY`, `BINANCE_API_SECRET`: Required when `BROKER=binance`
//! - `FEED`: simulated | binance (default: simulated)
//! - `HTTP_PORT`: Observer stream and health port (default: 8080)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use bot_engine::application::ports::{Broker, DataFeed, StatePublisher};
use bot_engine::application::session::BotSession;
use bot_engine::infrastructure::broadcast::StateBroadcaster;
use bot_engine::infrastructure::broker::{BinanceBroker, SimulatedBroker};
use bot_engine::infrastructure::config::{BrokerKind, ConfigError, EngineConfig, FeedKind};
use bot_engine::infrastructure::feed::{BinanceFeed, SimulatedFeed};
use bot_engine::infrastructure::http::{HttpServer, HttpServerState};
use bot_engine::infrastructure::{metrics, telemetry};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

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

    tracing::info!("Starting bot engine");

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = EngineConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let broadcaster = StateBroadcaster::new(config.broadcast_config());
    let heartbeat = broadcaster.spawn_heartbeat(shutdown_token.clone());

    let broker = build_broker(&config)?;
    let feed = build_feed(&config);
    let publisher: Arc<dyn StatePublisher> = Arc::new(broadcaster.clone());

    let session = BotSession::new(config.session_config(), broker, feed, publisher)
        .start()
        .await?;

    let http_state = Arc::new(HttpServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        broadcaster.clone(),
        vec![session.clone()],
    ));
    let http_server = HttpServer::new(config.server.http_port, http_state, shutdown_token.clone());
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tracing::info!(bot = session.bot_name(), "Bot engine ready");

    await_shutdown().await;

    match session.stop().await {
        Ok(status) => tracing::info!(bot = %status.name, status = ?status.status, "Session stopped"),
        Err(e) => tracing::warn!(error = %e, "Session already stopped"),
    }

    broadcaster.shutdown();
    shutdown_token.cancel();

    let drain = async {
        let _ = heartbeat.await;
        let _ = http_task.await;
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Graceful shutdown timed out"
        );
    }

    tracing::info!("Bot engine stopped");
    Ok(())
}

fn build_broker(config: &EngineConfig) -> Result<Arc<dyn Broker>, Box<dyn std::error::Error>> {
    match config.broker {
        BrokerKind::Simulated => Ok(Arc::new(SimulatedBroker::new(config.bot.name.clone()))),
        BrokerKind::Binance => {
            let binance = config
                .binance_config()
                .ok_or_else(|| ConfigError::MissingEnvVar("BINANCE_API_KEY".to_string()))?;
            if binance.environment.is_live() {
                tracing::warn!("LIVE trading enabled: orders use real funds");
            }
            Ok(Arc::new(BinanceBroker::new(&binance, config.bot.name.clone())?))
        }
    }
}

fn build_feed(config: &EngineConfig) -> Arc<dyn DataFeed> {
    match config.feed.kind {
        FeedKind::Simulated => Arc::new(SimulatedFeed::new(config.simulated_feed_config())),
        FeedKind::Binance => Arc::new(BinanceFeed::new(config.binance_feed_config())),
    }
}

fn log_config(config: &EngineConfig) {
    tracing::info!(
        bot = %config.bot.name,
        strategy = %config.bot.strategy,
        symbols = ?config.bot.symbols,
        broker = ?config.broker,
        trading_mode = ?config.trading_mode,
        feed = ?config.feed.kind,
        http_port = config.server.http_port,
        "Configuration loaded"
    );
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
