//! End-to-end tests over real WebSocket connections

mod common;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use common::test_state;
use vibhub_hub::{app, HubState};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve the hub on an ephemeral port and return its socket URL
async fn boot(state: HubState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app(state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    format!("ws://{addr}/ws")
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn send(ws: &mut WsStream, frame: Value) {
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

async fn next_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Skip frames until one carries the given event name
async fn next_event(ws: &mut WsStream, name: &str) -> Value {
    loop {
        let frame = next_json(ws).await;
        if frame["event"] == name {
            return frame;
        }
    }
}

async fn next_ack(ws: &mut WsStream, id: u64) -> Value {
    loop {
        let frame = next_json(ws).await;
        if frame["ack"] == id {
            return frame;
        }
    }
}

/// True once the hub closes the socket
async fn closed_by_hub(ws: &mut WsStream) -> bool {
    loop {
        match timeout(TIMEOUT, ws.next()).await {
            Err(_) => return false,
            Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return true,
            Ok(Some(Ok(_))) => continue,
        }
    }
}

/// App hooked to `lamp`, waiting for acks
async fn hooked_app(url: &str) -> WsStream {
    let mut ws = connect(url).await;
    send(&mut ws, json!({"event": "hookup", "data": "lamp", "ack": 1})).await;
    assert_eq!(next_ack(&mut ws, 1).await["message"], json!(["lamp"]));
    ws
}

async fn registered_device(url: &str, id: &str) -> WsStream {
    let mut ws = connect(url).await;
    send(&mut ws, json!({"event": "id", "data": id, "ack": 1})).await;
    assert_eq!(next_ack(&mut ws, 1).await["success"], json!(true));
    ws
}

#[tokio::test]
async fn test_duplicate_device_evicts_old_socket() {
    let state = test_state();
    let url = boot(state.clone()).await;

    let mut app_ws = hooked_app(&url).await;
    let mut first = registered_device(&url, "lamp").await;
    let online = next_event(&mut app_ws, "dev_online").await;
    let first_conn = online["args"][1].clone();

    let mut second = registered_device(&url, "LAMP").await;
    assert!(closed_by_hub(&mut first).await);

    let online = next_event(&mut app_ws, "dev_online").await;
    assert_ne!(online["args"][1], first_conn);
    let offline = next_event(&mut app_ws, "dev_offline").await;
    assert_eq!(offline["args"], json!(["lamp", first_conn]));

    // The evicted socket's cleanup has run by the time apps hear dev_offline
    assert_eq!(state.connections.total_connections(), 2);
    let stats = state.router.lock().await.stats();
    assert_eq!(stats.devices, 1);
    assert_eq!(stats.apps, 1);

    send(&mut app_ws, json!({"event": "p", "data": "00ff"})).await;
    let pwm = next_event(&mut second, "p").await;
    assert_eq!(pwm["args"], json!(["ff"]));
}

#[tokio::test]
async fn test_client_close_notifies_apps() {
    let state = test_state();
    let url = boot(state.clone()).await;

    let mut app_ws = hooked_app(&url).await;
    let mut device = registered_device(&url, "lamp").await;
    let online = next_event(&mut app_ws, "dev_online").await;
    let device_conn = online["args"][1].clone();

    device.close(None).await.unwrap();

    let offline = next_event(&mut app_ws, "dev_offline").await;
    assert_eq!(offline["args"], json!(["lamp", device_conn]));
    assert_eq!(state.connections.total_connections(), 1);
}

#[tokio::test]
async fn test_binary_frame_over_socket() {
    let state = test_state();
    let url = boot(state).await;

    let mut app_ws = hooked_app(&url).await;
    let mut device = registered_device(&url, "lamp").await;
    next_event(&mut app_ws, "dev_online").await;

    app_ws
        .send(Message::Binary(vec![0x00, 0x10, 0x20]))
        .await
        .unwrap();
    let pwm = next_event(&mut device, "p").await;
    assert_eq!(pwm["args"], json!(["1020"]));
}
