use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use txflow_bus::{Bus, Topics};
use txflow_bus_memory::{MemoryBus, MemoryBusOptions};
use txflow_envelope::Risk;
use txflow_fanout::{EventRouter, SubscriptionRegistry};
use txflow_gateway::{Error, Gateway, GatewayOptions};
use txflow_orchestrator::{
    FixedRisk, Orchestrator, OrchestratorConfig, TransactionRequest, initiate_transaction,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn options() -> GatewayOptions {
    GatewayOptions {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        ..GatewayOptions::default()
    }
}

async fn start_gateway() -> (Gateway, SocketAddr) {
    let _ = tracing_subscriber::fmt::try_init();

    let gateway = Gateway::new(options(), Arc::new(SubscriptionRegistry::new()));
    let addr = gateway.start().await.unwrap();
    (gateway, addr)
}

async fn connect(addr: SocketAddr) -> (Client, String) {
    let (mut client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let greeting = next_frame(&mut client).await;
    assert_eq!(greeting["event"], "connected");
    let socket_id = greeting["data"]["socketId"].as_str().unwrap().to_string();

    (client, socket_id)
}

async fn send(client: &mut Client, frame: Value) {
    client
        .send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();
}

async fn next_frame(client: &mut Client) -> Value {
    loop {
        let message = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .unwrap();

        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn test_greeting_and_stats() {
    let (gateway, addr) = start_gateway().await;
    let (mut client, socket_id) = connect(addr).await;
    assert!(!socket_id.is_empty());

    send(&mut client, json!({ "event": "getStats" })).await;
    assert_eq!(
        next_frame(&mut client).await,
        json!({ "event": "stats", "data": { "totalClients": 1, "totalSubscriptions": 0 } })
    );

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_and_unsubscribe_acknowledgements() {
    let (gateway, addr) = start_gateway().await;
    let (mut client, _) = connect(addr).await;

    send(
        &mut client,
        json!({ "event": "subscribeToTx", "data": { "transactionId": "T1", "userId": "u1" } }),
    )
    .await;

    let first = next_frame(&mut client).await;
    assert_eq!(first["event"], "subscribed");
    assert_eq!(first["data"]["type"], "transactionId");
    assert_eq!(first["data"]["value"], "T1");

    let second = next_frame(&mut client).await;
    assert_eq!(second["data"]["type"], "userId");
    assert_eq!(second["data"]["value"], "u1");

    send(&mut client, json!({ "event": "getStats" })).await;
    assert_eq!(next_frame(&mut client).await["data"]["totalSubscriptions"], 2);

    send(
        &mut client,
        json!({ "event": "unsubscribeFromTx", "data": { "transactionId": "T1" } }),
    )
    .await;
    assert_eq!(
        next_frame(&mut client).await,
        json!({ "event": "unsubscribed", "data": { "type": "transactionId", "value": "T1" } })
    );

    send(&mut client, json!({ "event": "getStats" })).await;
    assert_eq!(next_frame(&mut client).await["data"]["totalSubscriptions"], 1);

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_bad_requests_get_error_replies() {
    let (gateway, addr) = start_gateway().await;
    let (mut client, _) = connect(addr).await;

    send(&mut client, json!({ "event": "subscribeToTx", "data": {} })).await;
    assert_eq!(
        next_frame(&mut client).await,
        json!({ "event": "error", "data": { "message": "Please provide transactionId or userId" } })
    );

    client
        .send(Message::Text("not json".into()))
        .await
        .unwrap();
    assert_eq!(next_frame(&mut client).await["event"], "error");

    // The connection stays usable after errors.
    send(&mut client, json!({ "event": "getStats" })).await;
    assert_eq!(next_frame(&mut client).await["event"], "stats");

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_closed_client_is_unregistered() {
    let (gateway, addr) = start_gateway().await;
    let (mut client, _) = connect(addr).await;
    assert_eq!(gateway.registry().stats().total_clients, 1);

    client.close(None).await.unwrap();

    timeout(Duration::from_secs(2), async {
        while gateway.registry().stats().total_clients > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_health_endpoint() {
    let (gateway, addr) = start_gateway().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut response = String::new();
    timeout(Duration::from_secs(2), stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.ends_with("OK"));

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let _ = tracing_subscriber::fmt::try_init();

    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let gateway = Gateway::new(
        GatewayOptions {
            listen_addr: taken.local_addr().unwrap(),
            ..GatewayOptions::default()
        },
        Arc::new(SubscriptionRegistry::new()),
    );

    assert!(matches!(gateway.start().await, Err(Error::Bind { .. })));
}

#[tokio::test]
async fn test_saga_events_reach_the_client() {
    let (gateway, addr) = start_gateway().await;

    let bus = MemoryBus::new(MemoryBusOptions::default());
    bus.open().await.unwrap();
    let topics = Topics::default();

    let _orchestration = Orchestrator::new(
        bus.clone(),
        FixedRisk(Risk::Low),
        OrchestratorConfig::from_topics(&topics),
    )
    .start()
    .await
    .unwrap();
    let _routing = EventRouter::new(gateway.registry().clone())
        .start(&bus, &topics.events)
        .await
        .unwrap();

    let (mut client, _) = connect(addr).await;
    send(
        &mut client,
        json!({ "event": "subscribeToTx", "data": { "userId": "alice" } }),
    )
    .await;
    assert_eq!(next_frame(&mut client).await["event"], "subscribed");

    let command = initiate_transaction(
        &bus,
        &topics.commands,
        TransactionRequest {
            from_account: "A1".to_string(),
            to_account: "A2".to_string(),
            amount: dec!(25.50),
            currency: None,
            user_id: "alice".to_string(),
        },
    )
    .await
    .unwrap();

    let mut types = Vec::new();
    for _ in 0..4 {
        let frame = next_frame(&mut client).await;
        assert_eq!(frame["event"], "transactionEvent");
        assert_eq!(frame["data"]["transactionId"], command.transaction_id.as_str());
        assert_eq!(frame["data"]["correlationId"], command.transaction_id.as_str());
        types.push(frame["data"]["type"].as_str().unwrap().to_string());
    }

    assert_eq!(
        types,
        [
            "txn.FundsReserved",
            "txn.FraudChecked",
            "txn.Committed",
            "txn.Notified"
        ]
    );

    gateway.shutdown().await;
    bus.close().await.unwrap();
}
