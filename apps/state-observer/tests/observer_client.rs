//! Observer client against an in-process engine stand-in.
//!
//! A tokio-tungstenite server plays a scripted message sequence per
//! connection; the client under test mirrors it into a shared store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bot_engine::domain::bot::{BotState, BotStatus, StrategyDescriptor};
use bot_engine::domain::log::{LogLevel, SystemLog};
use bot_engine::domain::order::{Order, OrderRequest, OrderSide};
use bot_engine::domain::position::PositionSnapshot;
use bot_engine::domain::shared::OrderId;
use bot_engine::domain::sync::{StateSnapshot, SyncMessage};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use state_observer::{ConnectionStatus, ObserverClient, ObserverConfig, ObserverStore, SharedStore};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tokio_util::sync::CancellationToken;

type ServerWs = WebSocketStream<TcpStream>;

// =============================================================================
// Engine stand-in
// =============================================================================

struct Engine {
    url: String,
    connections: Arc<AtomicUsize>,
}

impl Engine {
    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Serve `script(connection_index, socket)` for every accepted connection.
async fn spawn_engine<F, Fut>(script: F) -> Engine
where
    F: Fn(usize, ServerWs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connections);
    let script = Arc::new(script);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let script = Arc::clone(&script);
            tokio::spawn(async move {
                if let Ok(ws) = accept_async(stream).await {
                    script(index, ws).await;
                }
            });
        }
    });

    Engine { url, connections }
}

async fn send(ws: &mut ServerWs, message: &SyncMessage) {
    ws.send(Message::Text(message.encode().unwrap().into()))
        .await
        .unwrap();
}

/// Keep the socket open until the client goes away.
async fn hold(mut ws: ServerWs) {
    while let Some(Ok(_)) = ws.next().await {}
}

// =============================================================================
// Fixtures
// =============================================================================

fn position(symbol: &str) -> PositionSnapshot {
    PositionSnapshot {
        symbol: symbol.to_string(),
        bot_name: "bot-crypto".to_string(),
        quantity: dec!(0),
        average_price: dec!(0),
        realized_pnl: dec!(0),
        unrealized_pnl: dec!(0),
        mark_price: None,
        updated_at: Utc::now(),
    }
}

fn order(id: &str) -> Order {
    Order::new(
        OrderId::new(id),
        &OrderRequest::limit("BTC/USD", OrderSide::Buy, dec!(1), dec!(68000)),
        "bot-crypto",
    )
}

fn running_bot() -> BotStatus {
    BotStatus::new(
        "bot-crypto",
        BotState::Running,
        StrategyDescriptor::new("Manual", "BTC/USD"),
    )
}

fn snapshot(positions: Vec<PositionSnapshot>, orders: Vec<Order>) -> SyncMessage {
    let mut bot_statuses = BTreeMap::new();
    bot_statuses.insert("bot-crypto".to_string(), running_bot());
    SyncMessage::InitialState(StateSnapshot {
        positions,
        orders,
        bot_statuses,
    })
}

struct Observer {
    store: SharedStore,
    token: CancellationToken,
    task: JoinHandle<()>,
}

fn observe(url: &str, heartbeat_timeout: Duration) -> Observer {
    let config = ObserverConfig {
        reconnect_delay: Duration::from_millis(50),
        heartbeat_timeout: Some(heartbeat_timeout),
        connect_timeout: Duration::from_secs(1),
        ..ObserverConfig::with_url(url)
    };
    let store: SharedStore = Arc::new(Mutex::new(ObserverStore::default()));
    let token = CancellationToken::new();
    let task = tokio::spawn(ObserverClient::new(config, Arc::clone(&store), token.clone()).run());
    Observer { store, token, task }
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn snapshot_and_deltas_are_mirrored() {
    let engine = spawn_engine(|_, mut ws| async move {
        send(&mut ws, &snapshot(vec![position("BTC/USD"), position("ETH/USD")], vec![])).await;
        send(&mut ws, &SyncMessage::OrderUpdate(order("o-1"))).await;
        send(
            &mut ws,
            &SyncMessage::LogMessage(SystemLog::new(LogLevel::Cmd, "bot-crypto", "BUY 1 BTC/USD")),
        )
        .await;
        hold(ws).await;
    })
    .await;
    let observer = observe(&engine.url, Duration::from_secs(5));

    eventually("order and log", || {
        let store = observer.store.lock();
        store.open_orders().len() == 1 && store.logs().len() == 1
    })
    .await;

    {
        let store = observer.store.lock();
        assert_eq!(store.status(), ConnectionStatus::Connected);
        assert_eq!(store.positions().count(), 2);
        assert_eq!(store.open_orders()[0].id().as_str(), "o-1");
        assert_eq!(store.logs().iter().next().unwrap().level, LogLevel::Cmd);
        assert_eq!(store.snapshots_received(), 1);
    }

    observer.token.cancel();
    observer.task.await.unwrap();
}

#[tokio::test]
async fn deltas_before_snapshot_are_dropped() {
    let engine = spawn_engine(|_, mut ws| async move {
        send(&mut ws, &SyncMessage::OrderUpdate(order("o-early"))).await;
        send(&mut ws, &snapshot(vec![], vec![])).await;
        send(&mut ws, &SyncMessage::PositionUpdate(position("BTC/USD"))).await;
        hold(ws).await;
    })
    .await;
    let observer = observe(&engine.url, Duration::from_secs(5));

    eventually("position update", || observer.store.lock().positions().count() == 1).await;

    assert!(observer.store.lock().open_orders().is_empty());
    observer.token.cancel();
    observer.task.await.unwrap();
}

#[tokio::test]
async fn reconnect_takes_fresh_snapshot() {
    let engine = spawn_engine(|index, mut ws| async move {
        if index == 0 {
            send(&mut ws, &snapshot(vec![], vec![order("o-1")])).await;
            let _ = ws.close(None).await;
        } else {
            send(&mut ws, &snapshot(vec![], vec![order("o-2")])).await;
            hold(ws).await;
        }
    })
    .await;
    let observer = observe(&engine.url, Duration::from_secs(5));

    eventually("second snapshot", || observer.store.lock().snapshots_received() == 2).await;

    {
        let store = observer.store.lock();
        let ids: Vec<_> = store.open_orders().iter().map(|o| o.id().as_str()).collect();
        assert_eq!(ids, vec!["o-2"]);
        assert_eq!(store.status(), ConnectionStatus::Connected);
    }
    assert_eq!(engine.connections(), 2);

    observer.token.cancel();
    observer.task.await.unwrap();
}

#[tokio::test]
async fn silent_engine_triggers_reconnect() {
    let engine = spawn_engine(|_, mut ws| async move {
        send(&mut ws, &snapshot(vec![], vec![])).await;
        hold(ws).await;
    })
    .await;
    let observer = observe(&engine.url, Duration::from_millis(150));

    eventually("reconnect after silence", || engine.connections() >= 2).await;

    observer.token.cancel();
    observer.task.await.unwrap();
}

#[tokio::test]
async fn legacy_envelope_is_accepted() {
    let engine = spawn_engine(|_, mut ws| async move {
        let legacy = r#"{"type":"initial_state","payload":{"positions":[],"orders":[],"botStatuses":{}}}"#;
        ws.send(Message::Text(legacy.to_string().into())).await.unwrap();
        hold(ws).await;
    })
    .await;
    let observer = observe(&engine.url, Duration::from_secs(5));

    eventually("legacy snapshot", || observer.store.lock().snapshots_received() == 1).await;

    observer.token.cancel();
    observer.task.await.unwrap();
}

#[tokio::test]
async fn cancellation_disconnects() {
    let engine = spawn_engine(|_, mut ws| async move {
        send(&mut ws, &snapshot(vec![], vec![])).await;
        hold(ws).await;
    })
    .await;
    let observer = observe(&engine.url, Duration::from_secs(5));
    eventually("snapshot", || observer.store.lock().snapshots_received() == 1).await;

    observer.token.cancel();
    tokio::time::timeout(Duration::from_secs(2), observer.task)
        .await
        .unwrap()
        .unwrap();

    let store = observer.store.lock();
    assert_eq!(store.status(), ConnectionStatus::Disconnected);
    assert!(store.is_awaiting_snapshot());
}
