//! WebSocket connection management
//!
//! Tracks the outbound queue of every live socket so the relay can deliver
//! events and force-close stale connections without touching the sockets
//! directly.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::messages::ServerFrame;

/// Unique id assigned to a socket when it is accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Handle for sending messages to a specific WebSocket connection
#[derive(Debug)]
pub struct ConnectionHandle {
    sender: mpsc::UnboundedSender<ServerFrame>,

    /// Cancelled when the hub wants the socket closed
    shutdown: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::UnboundedSender<ServerFrame>) -> Self {
        Self {
            sender,
            shutdown: CancellationToken::new(),
        }
    }

    /// Queue a frame for this connection
    #[allow(clippy::result_large_err)]
    pub fn send(&self, frame: ServerFrame) -> Result<(), mpsc::error::SendError<ServerFrame>> {
        self.sender.send(frame)
    }

    /// Check if the socket side is still reading the queue
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed() && !self.shutdown.is_cancelled()
    }

    /// Token the socket task watches for forced closes
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ask the socket task to close the connection
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

/// Manages outbound queues for every live connection
///
/// Uses DashMap for concurrent access from socket tasks and the relay.
/// Wrapped in Arc for cheap cloning.
#[derive(Debug, Clone, Default)]
pub struct ConnectionManager {
    connections: Arc<DashMap<ConnectionId, ConnectionHandle>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
        }
    }

    /// Register a new connection, returning the token that closes it
    pub fn add_connection(
        &self,
        id: ConnectionId,
        sender: mpsc::UnboundedSender<ServerFrame>,
    ) -> CancellationToken {
        let handle = ConnectionHandle::new(sender);
        let token = handle.shutdown_token();
        self.connections.insert(id, handle);

        tracing::debug!(
            connection_id = %id,
            total = self.connections.len(),
            "Connection added"
        );

        token
    }

    /// Remove a connection
    pub fn remove_connection(&self, id: ConnectionId) -> bool {
        let removed = self.connections.remove(&id).is_some();
        if removed {
            tracing::debug!(connection_id = %id, "Connection removed");
        }
        removed
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.connections
            .get(&id)
            .map(|handle| handle.is_alive())
            .unwrap_or(false)
    }

    /// Send a frame to a specific connection
    pub fn send_to(&self, id: ConnectionId, frame: ServerFrame) -> Result<(), SendError> {
        let handle = self
            .connections
            .get(&id)
            .ok_or(SendError::ConnectionNotFound)?;

        handle.send(frame).map_err(|_| SendError::ConnectionClosed)
    }

    /// Force-close a connection; its socket task runs the normal cleanup
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        match self.connections.get(&id) {
            Some(handle) => {
                handle.close();
                tracing::debug!(connection_id = %id, "Connection close requested");
                true
            }
            None => false,
        }
    }

    /// Get total number of live connections
    pub fn total_connections(&self) -> usize {
        self.connections.len()
    }
}

/// Error type for send operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("connection not found")]
    ConnectionNotFound,
    #[error("connection closed")]
    ConnectionClosed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::messages::AckFrame;

    fn ack(id: u64) -> ServerFrame {
        ServerFrame::Ack(AckFrame::success(id, serde_json::Value::Null))
    }

    #[test]
    fn test_connection_manager_add_remove() {
        let manager = ConnectionManager::new();
        let id = ConnectionId::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        manager.add_connection(id, tx);
        assert!(manager.is_connected(id));
        assert_eq!(manager.total_connections(), 1);

        assert!(manager.remove_connection(id));
        assert!(!manager.is_connected(id));
        assert_eq!(manager.total_connections(), 0);
        assert!(!manager.remove_connection(id));
    }

    #[test]
    fn test_send_to_delivers_frame() {
        let manager = ConnectionManager::new();
        let id = ConnectionId::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.add_connection(id, tx);

        manager.send_to(id, ack(7)).unwrap();
        assert_eq!(rx.try_recv().unwrap(), ack(7));
    }

    #[test]
    fn test_send_to_unknown_connection() {
        let manager = ConnectionManager::new();
        let result = manager.send_to(ConnectionId::new(), ack(1));
        assert_eq!(result, Err(SendError::ConnectionNotFound));
    }

    #[test]
    fn test_send_to_dropped_receiver() {
        let manager = ConnectionManager::new();
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        manager.add_connection(id, tx);
        drop(rx);

        assert_eq!(manager.send_to(id, ack(1)), Err(SendError::ConnectionClosed));
        assert!(!manager.is_connected(id));
    }

    #[test]
    fn test_disconnect_cancels_token() {
        let manager = ConnectionManager::new();
        let id = ConnectionId::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let token = manager.add_connection(id, tx);

        assert!(!token.is_cancelled());
        assert!(manager.disconnect(id));
        assert!(token.is_cancelled());
        assert!(!manager.is_connected(id));
        assert!(!manager.disconnect(ConnectionId::new()));
    }

    #[test]
    fn test_connection_id_parse_roundtrip() {
        let id = ConnectionId::new();
        let parsed: ConnectionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-connection".parse::<ConnectionId>().is_err());
    }
}
