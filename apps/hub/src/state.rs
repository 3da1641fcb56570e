//! Shared application state

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::config::HubConfig;
use crate::relay::RelayRouter;
use crate::websocket::ConnectionManager;

/// State handed to every HTTP and WebSocket handler
///
/// The router sits behind one async mutex: every inbound message and every
/// disconnect runs to completion before the next one starts.
#[derive(Clone)]
pub struct HubState {
    pub router: Arc<Mutex<RelayRouter>>,
    pub connections: ConnectionManager,
    pub config: Arc<HubConfig>,
    pub started_at: Instant,
}

impl HubState {
    pub fn new(config: HubConfig) -> Self {
        let connections = ConnectionManager::new();
        let router = RelayRouter::new(connections.clone(), config.identity_policy());
        Self {
            router: Arc::new(Mutex::new(router)),
            connections,
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }
}
