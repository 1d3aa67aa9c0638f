//! Bridge integration tests: real websocket clients against an in-process
//! bridge server, exercising registration, addressing, and disconnects.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;

use actionbus_bridge::{Bridge, BridgeMessage};
use actionbus_core::action::{root, Action, DispatchAction, ROOT_MODULE_NAME};
use actionbus_core::bus::ActionBus;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(2);

async fn start_bridge() -> (ActionBus, SocketAddr, CancellationToken) {
    let bus = ActionBus::new();
    let bridge = Bridge::bind(bus.clone(), "127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = bridge.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        bridge.run(token).await.unwrap();
    });
    (bus, addr, shutdown)
}

async fn register(addr: SocketAddr, client_id: &str) -> WsClient {
    let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
    let registration = BridgeMessage::ClientRegistration {
        client_id: client_id.to_string(),
    };
    ws.send(WsMessage::Text(registration.encode().unwrap()))
        .await
        .unwrap();
    ws
}

/// Register a client and wait until the bus has announced it, so the
/// client's outbound subscription is known to be live.
async fn register_and_await(bus: &ActionBus, addr: SocketAddr, client_id: &str) -> WsClient {
    let expected = client_id.to_string();
    let (mut rx, sub) = bus.filtered_stream(move |action| {
        action.is_type(ROOT_MODULE_NAME, root::CLIENT_CONNECT)
            && action.payload["clientId"] == expected.as_str()
    });
    let ws = register(addr, client_id).await;
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for clientConnect")
        .expect("bus stream closed");
    sub.cancel();
    ws
}

/// Receive forwarded actions until one matches, returning everything seen
/// up to and including the match.
async fn recv_until(ws: &mut WsClient, module_name: &str, action_type: &str) -> Vec<Action> {
    let mut seen = Vec::new();
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed")
            .expect("websocket error");
        if let WsMessage::Text(raw) = frame {
            match BridgeMessage::decode(&raw).expect("malformed server frame") {
                BridgeMessage::ServerAction { action } => {
                    let done = action.is_type(module_name, action_type);
                    seen.push(action);
                    if done {
                        return seen;
                    }
                }
                other => panic!("unexpected bridge message: {:?}", other),
            }
        }
    }
}

#[tokio::test]
async fn test_broadcast_actions_reach_all_clients() {
    let (bus, addr, _shutdown) = start_bridge().await;
    let mut c1 = register_and_await(&bus, addr, "c1").await;
    let mut c2 = register_and_await(&bus, addr, "c2").await;

    bus.emit_from(
        DispatchAction::new("Chat", "message", json!({ "text": "hello" })),
        "Chat",
        "Chat",
    );

    let seen1 = recv_until(&mut c1, "Chat", "message").await;
    let seen2 = recv_until(&mut c2, "Chat", "message").await;
    assert_eq!(seen1.last().unwrap().payload["text"], "hello");
    assert_eq!(seen2.last().unwrap().payload["text"], "hello");
}

#[tokio::test]
async fn test_targeting_and_server_only_filter_delivery() {
    let (bus, addr, _shutdown) = start_bridge().await;
    let mut c1 = register_and_await(&bus, addr, "c1").await;
    let mut c2 = register_and_await(&bus, addr, "c2").await;

    bus.emit_from(
        DispatchAction::new("Chat", "private", json!({})).target_client("c1"),
        "Chat",
        "Chat",
    );
    bus.emit_from(
        DispatchAction::new("Chat", "internal", json!({})).server_only(),
        "Chat",
        "Chat",
    );
    bus.emit_from(DispatchAction::new("Chat", "marker", json!({})), "Chat", "Chat");

    let seen1 = recv_until(&mut c1, "Chat", "marker").await;
    assert!(seen1.iter().any(|a| a.is_type("Chat", "private")));
    assert!(!seen1.iter().any(|a| a.is_type("Chat", "internal")));

    let seen2 = recv_until(&mut c2, "Chat", "marker").await;
    assert!(!seen2.iter().any(|a| a.is_type("Chat", "private")));
    assert!(!seen2.iter().any(|a| a.is_type("Chat", "internal")));
}

#[tokio::test]
async fn test_client_action_is_stamped_and_not_echoed() {
    let (bus, addr, _shutdown) = start_bridge().await;
    let mut c1 = register_and_await(&bus, addr, "c1").await;
    let mut c2 = register_and_await(&bus, addr, "c2").await;

    let (mut bus_rx, _sub) = bus.filtered_stream(|a| a.is_type("Chat", "message"));

    let action = DispatchAction::new("Chat", "message", json!({ "text": "from c1" }))
        .stamped("Chat", "Chat");
    let frame = BridgeMessage::ClientAction { action }.encode().unwrap();
    c1.send(WsMessage::Text(frame)).await.unwrap();

    // The bus sees the action with the sender's client id stamped in
    let emitted = timeout(WAIT, bus_rx.recv())
        .await
        .expect("timed out")
        .expect("bus stream closed");
    assert_eq!(emitted.from_client_id.as_deref(), Some("c1"));

    // The other client receives it; the sender does not get an echo
    let seen2 = recv_until(&mut c2, "Chat", "message").await;
    assert_eq!(seen2.last().unwrap().payload["text"], "from c1");

    bus.emit_from(DispatchAction::new("Chat", "marker", json!({})), "Chat", "Chat");
    let seen1 = recv_until(&mut c1, "Chat", "marker").await;
    assert!(!seen1.iter().any(|a| a.is_type("Chat", "message")));
}

#[tokio::test]
async fn test_malformed_frames_are_discarded_without_closing() {
    let (bus, addr, _shutdown) = start_bridge().await;
    let mut c1 = register_and_await(&bus, addr, "c1").await;

    let (mut bus_rx, _sub) = bus.filtered_stream(|a| a.is_type("Chat", "message"));

    c1.send(WsMessage::Text("not even json".to_string()))
        .await
        .unwrap();
    c1.send(WsMessage::Text(
        json!({ "event": "clientAction", "action": { "moduleName": "Chat" } }).to_string(),
    ))
    .await
    .unwrap();

    // The connection survives and a valid action still goes through
    let action = DispatchAction::new("Chat", "message", json!({ "text": "still here" }))
        .stamped("Chat", "Chat");
    let frame = BridgeMessage::ClientAction { action }.encode().unwrap();
    c1.send(WsMessage::Text(frame)).await.unwrap();

    let emitted = timeout(WAIT, bus_rx.recv())
        .await
        .expect("timed out")
        .expect("bus stream closed");
    assert_eq!(emitted.payload["text"], "still here");
    assert_eq!(emitted.from_client_id.as_deref(), Some("c1"));
}

#[tokio::test]
async fn test_invalid_registration_closes_connection() {
    let (_bus, addr, _shutdown) = start_bridge().await;
    let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

    // First frame is not a registration
    let action = DispatchAction::new("Chat", "message", json!({})).stamped("Chat", "Chat");
    let frame = BridgeMessage::ClientAction { action }.encode().unwrap();
    ws.send(WsMessage::Text(frame)).await.unwrap();

    let closed = timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "connection was not closed");
}

#[tokio::test]
async fn test_disconnect_emits_root_client_disconnect() {
    let (bus, addr, _shutdown) = start_bridge().await;
    let c1 = register_and_await(&bus, addr, "c1").await;

    let (mut rx, _sub) = bus.filtered_stream(|action| {
        action.is_type(ROOT_MODULE_NAME, root::CLIENT_DISCONNECT)
    });
    drop(c1);

    let action = timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for clientDisconnect")
        .expect("bus stream closed");
    assert_eq!(action.payload["clientId"], "c1");
    assert!(action.is_root());
}

#[tokio::test]
async fn test_connector_bridges_two_buses() {
    let (server_bus, addr, _shutdown) = start_bridge().await;
    let client_bus = ActionBus::new();

    let (mut connect_rx, _csub) = client_bus
        .filtered_stream(|a| a.is_type(ROOT_MODULE_NAME, root::SERVER_CONNECT));
    let (mut registered_rx, _rsub) = server_bus.filtered_stream(|action| {
        action.is_type(ROOT_MODULE_NAME, root::CLIENT_CONNECT)
            && action.payload["clientId"] == "local"
    });

    let connector = actionbus_bridge::Connector::connect(
        client_bus.clone(),
        actionbus_bridge::ConnectorOptions {
            host: "127.0.0.1".to_string(),
            port: addr.port(),
            client_id: Some("local".to_string()),
        },
    )
    .await
    .unwrap();
    assert_eq!(connector.client_id(), "local");

    // Local serverConnect announcement
    timeout(WAIT, connect_rx.recv())
        .await
        .expect("timed out waiting for serverConnect")
        .expect("bus stream closed");
    timeout(WAIT, registered_rx.recv())
        .await
        .expect("timed out waiting for clientConnect on the server bus")
        .expect("bus stream closed");

    // Upward: dispatch through the connector, observe on the server bus
    let (mut server_rx, _ssub) = server_bus.filtered_stream(|a| a.is_type("Chat", "message"));
    connector.dispatch(DispatchAction::new("Chat", "message", json!({ "text": "up" })));
    let upward = timeout(WAIT, server_rx.recv())
        .await
        .expect("timed out")
        .expect("bus stream closed");
    assert_eq!(upward.payload["text"], "up");
    assert_eq!(upward.from_client_id.as_deref(), Some("local"));

    // Downward: emit on the server bus, observe on the client bus
    let (mut client_rx, _lsub) = client_bus.filtered_stream(|a| a.is_type("Chat", "reply"));
    server_bus.emit_from(
        DispatchAction::new("Chat", "reply", json!({ "text": "down" })),
        "Chat",
        "Chat",
    );
    let downward = timeout(WAIT, client_rx.recv())
        .await
        .expect("timed out")
        .expect("bus stream closed");
    assert_eq!(downward.payload["text"], "down");

    let (mut disc_rx, _dsub) = client_bus
        .filtered_stream(|a| a.is_type(ROOT_MODULE_NAME, root::SERVER_DISCONNECT));
    connector.shutdown();
    connector.wait().await.unwrap();
    timeout(WAIT, disc_rx.recv())
        .await
        .expect("timed out waiting for serverDisconnect")
        .expect("bus stream closed");
}
