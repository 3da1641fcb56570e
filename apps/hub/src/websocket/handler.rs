//! WebSocket upgrade handler and per-socket tasks

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use tokio::sync::mpsc;

use super::connection::ConnectionId;
use super::messages::{AckFrame, ClientFrame, ClientRequest, ServerFrame};
use crate::relay::{RelayError, RelayResult};
use crate::state::HubState;

/// WebSocket upgrade handler
///
/// No handshake is required: a socket starts unassigned and identifies
/// itself with its first `id`, `app` or `hookup` message.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<HubState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    let peer = connect_info
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    ws.on_upgrade(move |socket| handle_socket(socket, state, peer))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: HubState, peer: String) {
    let conn = ConnectionId::new();

    // Create unbounded channel for sending frames to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();
    let shutdown = state.connections.add_connection(conn, tx);
    state.router.lock().await.on_connect(conn);

    tracing::info!(connection_id = %conn, peer = %peer, "WebSocket connection opened");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Forward queued frames to the socket until closed or evicted
    let send_shutdown = shutdown.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = send_shutdown.cancelled() => {
                    tracing::debug!(connection_id = %conn, "Closing evicted connection");
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
                frame = rx.recv() => {
                    let Some(frame) = frame else { break };
                    match serde_json::to_string(&frame) {
                        Ok(json) => {
                            if ws_sender.send(Message::Text(json)).await.is_err() {
                                tracing::debug!(connection_id = %conn, "WebSocket send failed");
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to serialize frame");
                        }
                    }
                }
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => handle_text_frame(&recv_state, conn, &text).await,
                Ok(Message::Binary(bytes)) => handle_binary_frame(&recv_state, conn, &bytes).await,
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    tracing::trace!(connection_id = %conn, "Received ping/pong");
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(connection_id = %conn, "WebSocket close received");
                    break;
                }
                Err(e) => {
                    tracing::debug!(error = %e, connection_id = %conn, "WebSocket error");
                    break;
                }
            }
        }
    });

    // Wait for either task to complete, then abort the other
    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %conn, "Send task completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %conn, "Receive task completed");
            send_task.abort();
        }
    }

    state.connections.remove_connection(conn);
    state.router.lock().await.on_disconnect(conn);

    tracing::info!(
        connection_id = %conn,
        peer = %peer,
        evicted = shutdown.is_cancelled(),
        "WebSocket connection closed"
    );
}

/// Parse and route one JSON text frame
///
/// Frames that are not valid JSON envelopes are dropped.
pub async fn handle_text_frame(state: &HubState, conn: ConnectionId, text: &str) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, connection_id = %conn, "Failed to parse client frame");
            return;
        }
    };

    let ClientFrame { event, data, ack } = frame;
    let result = match ClientRequest::parse(&event, data) {
        Ok(request) => state.router.lock().await.dispatch(conn, request),
        Err(e) => Err(e.into()),
    };

    respond(state, conn, &event, ack, result);
}

/// Raw bytes are a `p` command in binary form
pub async fn handle_binary_frame(state: &HubState, conn: ConnectionId, bytes: &[u8]) {
    let request = ClientRequest::Pwm {
        hex: hex::encode(bytes),
    };
    let result = state.router.lock().await.dispatch(conn, request);
    respond(state, conn, "p", None, result);
}

fn respond(
    state: &HubState,
    conn: ConnectionId,
    event: &str,
    ack: Option<u64>,
    result: RelayResult<Option<Value>>,
) {
    let reply = match result {
        Ok(value) => ack.map(|id| AckFrame::success(id, value.unwrap_or(Value::Null))),
        Err(RelayError::Validation(e)) => {
            tracing::debug!(connection_id = %conn, event, error = %e, "Rejected client message");
            ack.map(|id| AckFrame::failure(id, &e))
        }
        Err(RelayError::Routing(e)) => {
            tracing::debug!(connection_id = %conn, event, error = %e, "Dropped undeliverable message");
            None
        }
    };

    if let Some(reply) = reply {
        if let Err(e) = state.connections.send_to(conn, ServerFrame::Ack(reply)) {
            tracing::debug!(connection_id = %conn, error = %e, "Failed to send ack");
        }
    }
}
