//! Test peers and hub fixtures

#![allow(dead_code)]

use axum::{body::Body, http::Request, http::StatusCode, Router};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

use vibhub_hub::relay::{DeviceDescriptor, IdentityPolicy, RelayResult, RelayRouter};
use vibhub_hub::websocket::messages::{AckFrame, ClientRequest, ServerEvent, ServerFrame};
use vibhub_hub::websocket::{ConnectionId, ConnectionManager};
use vibhub_hub::{HubConfig, HubState};

/// A fake client: its id plus the receiving end of its outbound queue
pub struct TestPeer {
    pub id: ConnectionId,
    pub rx: mpsc::UnboundedReceiver<ServerFrame>,
}

impl TestPeer {
    /// Every event queued so far
    pub fn events(&mut self) -> Vec<ServerEvent> {
        self.frames()
            .into_iter()
            .filter_map(|frame| match frame {
                ServerFrame::Event(event) => Some(event),
                ServerFrame::Ack(_) => None,
            })
            .collect()
    }

    /// Every ack queued so far
    pub fn acks(&mut self) -> Vec<AckFrame> {
        self.frames()
            .into_iter()
            .filter_map(|frame| match frame {
                ServerFrame::Ack(ack) => Some(ack),
                ServerFrame::Event(_) => None,
            })
            .collect()
    }

    pub fn frames(&mut self) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Names of the queued events, in order
    pub fn event_names(&mut self) -> Vec<&'static str> {
        self.events().iter().map(ServerEvent::name).collect()
    }
}

/// A relay router with channel-backed connections
pub struct TestHub {
    pub connections: ConnectionManager,
    pub router: RelayRouter,
}

impl TestHub {
    pub fn new() -> Self {
        Self::with_policy(IdentityPolicy::default())
    }

    pub fn with_policy(policy: IdentityPolicy) -> Self {
        let connections = ConnectionManager::new();
        let router = RelayRouter::new(connections.clone(), policy);
        Self {
            connections,
            router,
        }
    }

    pub fn connect(&mut self) -> TestPeer {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.add_connection(id, tx);
        self.router.on_connect(id);
        TestPeer { id, rx }
    }

    /// Close a peer the way the socket task does
    pub fn disconnect(&mut self, peer: &TestPeer) {
        self.connections.remove_connection(peer.id);
        self.router.on_disconnect(peer.id);
    }

    pub fn send(&mut self, peer: &TestPeer, request: ClientRequest) -> RelayResult<Option<Value>> {
        self.router.dispatch(peer.id, request)
    }

    /// Connect and register a device
    pub fn device(&mut self, id: &str) -> TestPeer {
        let peer = self.connect();
        self.send(
            &peer,
            ClientRequest::RegisterDevice {
                id: id.to_string(),
                descriptor: DeviceDescriptor::default(),
            },
        )
        .expect("device registration");
        peer
    }

    /// Connect a named app hooked to the given devices
    pub fn app(&mut self, name: &str, devices: &[&str]) -> TestPeer {
        let peer = self.connect();
        self.send(
            &peer,
            ClientRequest::RegisterApp {
                name: name.to_string(),
            },
        )
        .expect("app registration");
        if !devices.is_empty() {
            self.send(
                &peer,
                ClientRequest::Hookup {
                    ids: devices.iter().map(|s| s.to_string()).collect(),
                },
            )
            .expect("hookup");
        }
        peer
    }
}

/// Hub state with default configuration
pub fn test_state() -> HubState {
    HubState::new(HubConfig::default())
}

/// Attach a fake socket to a hub state
pub async fn attach(state: &HubState) -> TestPeer {
    let id = ConnectionId::new();
    let (tx, rx) = mpsc::unbounded_channel();
    state.connections.add_connection(id, tx);
    state.router.lock().await.on_connect(id);
    TestPeer { id, rx }
}

/// Issue a GET request and return status plus body bytes
pub async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

/// Issue a GET request and parse the body as JSON
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(app, uri).await;
    let json = serde_json::from_slice(&body).unwrap();
    (status, json)
}
