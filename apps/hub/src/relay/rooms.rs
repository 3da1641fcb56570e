//! Named connection groups and event fan-out
//!
//! Rooms are created on first join and dropped when their last member
//! leaves. Broadcasting to a missing room is a no-op.

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::identity::DeviceIdentity;
use crate::websocket::connection::{ConnectionId, ConnectionManager};
use crate::websocket::messages::{ServerEvent, ServerFrame};

/// Name of a room
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomName(String);

impl RoomName {
    /// Room holding the single live connection of a device
    pub fn device(identity: &DeviceIdentity) -> Self {
        Self(format!("{identity}_d"))
    }

    /// Room holding every app hooked to a device
    pub fn app_hooks(identity: &DeviceIdentity) -> Self {
        Self(format!("{identity}_a"))
    }

    /// Room joined by apps sharing a display name
    pub fn app_name(name: &str) -> Self {
        Self(format!("{name}_as"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Room membership plus delivery through the connection manager
#[derive(Debug, Default)]
pub struct RoomBroadcaster {
    connections: ConnectionManager,
    rooms: HashMap<RoomName, HashSet<ConnectionId>>,
    memberships: HashMap<ConnectionId, HashSet<RoomName>>,
}

impl RoomBroadcaster {
    pub fn new(connections: ConnectionManager) -> Self {
        Self {
            connections,
            rooms: HashMap::new(),
            memberships: HashMap::new(),
        }
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Add a connection to a room; false if it was already a member
    pub fn join(&mut self, conn: ConnectionId, room: RoomName) -> bool {
        let inserted = self.rooms.entry(room.clone()).or_default().insert(conn);
        if inserted {
            tracing::trace!(connection_id = %conn, room = %room, "Joined room");
            self.memberships.entry(conn).or_default().insert(room);
        }
        inserted
    }

    /// Remove a connection from a room; false if it was not a member
    pub fn leave(&mut self, conn: ConnectionId, room: &RoomName) -> bool {
        let removed = match self.rooms.get_mut(room) {
            Some(members) => {
                let removed = members.remove(&conn);
                if members.is_empty() {
                    self.rooms.remove(room);
                }
                removed
            }
            None => false,
        };

        if let Some(rooms) = self.memberships.get_mut(&conn) {
            rooms.remove(room);
            if rooms.is_empty() {
                self.memberships.remove(&conn);
            }
        }

        if removed {
            tracing::trace!(connection_id = %conn, room = %room, "Left room");
        }
        removed
    }

    /// Remove a connection from every room it is in
    pub fn leave_all(&mut self, conn: ConnectionId) {
        let Some(rooms) = self.memberships.remove(&conn) else {
            return;
        };
        for room in rooms {
            if let Some(members) = self.rooms.get_mut(&room) {
                members.remove(&conn);
                if members.is_empty() {
                    self.rooms.remove(&room);
                }
            }
        }
    }

    /// Snapshot of the current members of a room
    pub fn members(&self, room: &RoomName) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, conn: ConnectionId, room: &RoomName) -> bool {
        self.rooms
            .get(room)
            .map(|members| members.contains(&conn))
            .unwrap_or(false)
    }

    /// Deliver an event to every member of a room; returns the delivery count
    pub fn broadcast(&self, room: &RoomName, event: ServerEvent) -> usize {
        let members = self.members(room);
        if members.is_empty() {
            return 0;
        }

        let frame = ServerFrame::from(event);
        let mut delivered = 0;
        for conn in members {
            match self.connections.send_to(conn, frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(connection_id = %conn, room = %room, error = %e, "Broadcast skipped member");
                }
            }
        }
        delivered
    }

    /// Deliver an event to a single connection
    pub fn send_to(&self, conn: ConnectionId, event: ServerEvent) -> bool {
        match self.connections.send_to(conn, event.into()) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(connection_id = %conn, error = %e, "Direct send failed");
                false
            }
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::identity::IdentityPolicy;
    use tokio::sync::mpsc;

    fn attach(manager: &ConnectionManager) -> (ConnectionId, mpsc::UnboundedReceiver<ServerFrame>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        manager.add_connection(id, tx);
        (id, rx)
    }

    fn event() -> ServerEvent {
        ServerEvent::Pwm("ff".into())
    }

    #[test]
    fn test_room_names() {
        let id = IdentityPolicy::default().normalize("Lamp").unwrap();
        assert_eq!(RoomName::device(&id).as_str(), "lamp_d");
        assert_eq!(RoomName::app_hooks(&id).as_str(), "lamp_a");
        assert_eq!(RoomName::app_name("Remote").as_str(), "Remote_as");
    }

    #[test]
    fn test_broadcast_reaches_each_member_once() {
        let manager = ConnectionManager::new();
        let mut rooms = RoomBroadcaster::new(manager.clone());
        let (a, mut rx_a) = attach(&manager);
        let (b, mut rx_b) = attach(&manager);
        let (_c, mut rx_c) = attach(&manager);
        let room = RoomName::app_name("x");

        rooms.join(a, room.clone());
        rooms.join(b, room.clone());
        assert!(!rooms.join(b, room.clone()));

        assert_eq!(rooms.broadcast(&room, event()), 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_to_missing_room_is_noop() {
        let rooms = RoomBroadcaster::default();
        assert_eq!(rooms.broadcast(&RoomName::app_name("nobody"), event()), 0);
    }

    #[test]
    fn test_leave_drops_empty_rooms() {
        let mut rooms = RoomBroadcaster::default();
        let conn = ConnectionId::new();
        let room = RoomName::app_name("x");

        rooms.join(conn, room.clone());
        assert_eq!(rooms.room_count(), 1);
        assert!(rooms.leave(conn, &room));
        assert!(!rooms.leave(conn, &room));
        assert_eq!(rooms.room_count(), 0);
        assert!(!rooms.memberships.contains_key(&conn));
    }

    #[test]
    fn test_leave_all() {
        let mut rooms = RoomBroadcaster::default();
        let conn = ConnectionId::new();
        let other = ConnectionId::new();
        let shared = RoomName::app_name("shared");

        rooms.join(conn, RoomName::app_name("a"));
        rooms.join(conn, shared.clone());
        rooms.join(other, shared.clone());

        rooms.leave_all(conn);
        assert!(!rooms.memberships.contains_key(&conn));
        assert_eq!(rooms.members(&shared), vec![other]);
        assert_eq!(rooms.room_count(), 1);
    }
}
