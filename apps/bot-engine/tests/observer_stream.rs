//! Observer WebSocket protocol against an in-process server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bot_engine::application::ports::StatePublisher;
use bot_engine::domain::order::{Order, OrderRequest, OrderSide};
use bot_engine::domain::position::{Position, PositionKey};
use bot_engine::domain::shared::OrderId;
use bot_engine::domain::sync::{StateSnapshot, SyncMessage};
use bot_engine::infrastructure::broadcast::{BroadcastConfig, StateBroadcaster};
use bot_engine::infrastructure::http::{HttpServer, HttpServerState};
use futures_util::StreamExt;
use rust_decimal_macros::dec;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;

const BOT: &str = "bot-crypto";

struct Server {
    addr: SocketAddr,
    broadcaster: StateBroadcaster,
    cancel: CancellationToken,
}

async fn serve() -> Server {
    let broadcaster = StateBroadcaster::new(BroadcastConfig::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();

    let state = Arc::new(HttpServerState::new(
        "test".to_string(),
        broadcaster.clone(),
        Vec::new(),
    ));
    let server = HttpServer::new(addr.port(), state, cancel.clone());
    tokio::spawn(async move { server.serve(listener).await });

    Server {
        addr,
        broadcaster,
        cancel,
    }
}

fn position(symbol: &str) -> SyncMessage {
    SyncMessage::PositionUpdate(Position::flat(PositionKey::new(symbol, BOT)).snapshot(None))
}

fn order(id: &str) -> SyncMessage {
    let request = OrderRequest::limit("BTC/USD", OrderSide::Buy, dec!(1), dec!(69000));
    SyncMessage::OrderUpdate(Order::new(OrderId::new(id), &request, BOT))
}

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    ws
}

async fn next_message(ws: &mut Client) -> SyncMessage {
    let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("no frame in time")
        .expect("stream ended")
        .unwrap();
    match frame {
        Message::Text(text) => SyncMessage::decode(text.as_str()).unwrap(),
        other => panic!("unexpected frame {other:?}"),
    }
}

#[tokio::test]
async fn snapshot_with_two_positions_precedes_order_update() {
    let server = serve().await;
    server.broadcaster.publish(position("BTC/USD"));
    server.broadcaster.publish(position("ETH/USD"));

    let mut ws = connect(server.addr).await;
    let SyncMessage::InitialState(snapshot) = next_message(&mut ws).await else {
        panic!("first message must be initial_state");
    };
    assert_eq!(snapshot.positions.len(), 2);
    assert!(snapshot.orders.is_empty());

    server.broadcaster.publish(order("o-1"));
    let SyncMessage::OrderUpdate(update) = next_message(&mut ws).await else {
        panic!("expected order_update");
    };
    assert_eq!(update.id().as_str(), "o-1");

    server.cancel.cancel();
}

#[tokio::test]
async fn each_observer_gets_its_own_snapshot() {
    let server = serve().await;
    let mut first = connect(server.addr).await;
    assert!(matches!(next_message(&mut first).await, SyncMessage::InitialState(s) if s.orders.is_empty()));

    server.broadcaster.publish(order("o-1"));
    assert!(matches!(next_message(&mut first).await, SyncMessage::OrderUpdate(_)));

    let mut second = connect(server.addr).await;
    let SyncMessage::InitialState(snapshot) = next_message(&mut second).await else {
        panic!("expected initial_state");
    };
    assert_eq!(snapshot.orders.len(), 1);

    server.cancel.cancel();
}

#[tokio::test]
async fn shutdown_closes_observer_with_going_away() {
    let server = serve().await;
    let mut ws = connect(server.addr).await;
    assert!(matches!(next_message(&mut ws).await, SyncMessage::InitialState(_)));

    server.broadcaster.shutdown();

    let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let Message::Close(Some(close)) = frame else {
        panic!("expected close frame, got {frame:?}");
    };
    assert_eq!(close.code, CloseCode::Away);

    server.cancel.cancel();
}

#[tokio::test]
async fn state_endpoint_serves_snapshot() {
    let server = serve().await;
    server.broadcaster.publish(position("BTC/USD"));

    let snapshot: StateSnapshot = reqwest::get(format!("http://{}/state", server.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot.positions.len(), 1);
    assert_eq!(snapshot.positions[0].symbol, "BTC/USD");

    server.cancel.cancel();
}

#[tokio::test]
async fn liveness_probe_answers_ok() {
    let server = serve().await;

    let response = reqwest::get(format!("http://{}/healthz", server.addr))
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "OK");

    server.cancel.cancel();
}
