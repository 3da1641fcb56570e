//! Connection roles, device ownership and hookups
//!
//! The registry owns the role of every connection and keeps room membership
//! in step with it: a device sits in its self-room, an app sits in the
//! app-room of every device it has hooked.

use serde::Serialize;
use std::collections::HashMap;

use super::descriptor::DeviceDescriptor;
use super::error::ValidationError;
use super::identity::{DeviceIdentity, IdentityPolicy};
use super::rooms::{RoomBroadcaster, RoomName};
use super::session::{AppSession, ConnectionRole, DeviceSession, MAX_APP_NAME_LEN};
use crate::websocket::connection::{ConnectionId, ConnectionManager};
use crate::websocket::messages::ServerEvent;

/// Snapshot of registry sizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub connections: usize,
    pub devices: usize,
    pub apps: usize,
    pub unassigned: usize,
    pub rooms: usize,
}

/// Role state for every connection known to the hub
#[derive(Debug)]
pub struct ConnectionRegistry {
    policy: IdentityPolicy,
    roles: HashMap<ConnectionId, ConnectionRole>,
    rooms: RoomBroadcaster,
}

impl ConnectionRegistry {
    pub fn new(connections: ConnectionManager, policy: IdentityPolicy) -> Self {
        Self {
            policy,
            roles: HashMap::new(),
            rooms: RoomBroadcaster::new(connections),
        }
    }

    pub fn rooms(&self) -> &RoomBroadcaster {
        &self.rooms
    }

    pub fn role(&self, conn: ConnectionId) -> Option<&ConnectionRole> {
        self.roles.get(&conn)
    }

    pub fn normalize(&self, raw: &str) -> Result<DeviceIdentity, ValidationError> {
        self.policy.normalize(raw)
    }

    /// Track a freshly accepted connection
    pub fn on_connect(&mut self, conn: ConnectionId) {
        self.roles.entry(conn).or_default();
    }

    /// Promote a connection to the device owning `raw_id`
    ///
    /// Any other connection in the self-room is evicted: its socket is closed
    /// and it leaves all rooms now, while its own disconnect cleanup runs
    /// later.
    pub fn register_device(
        &mut self,
        conn: ConnectionId,
        raw_id: &str,
        descriptor: DeviceDescriptor,
    ) -> Result<DeviceSession, ValidationError> {
        let identity = self.normalize(raw_id)?;

        // Switching roles (or device ids) sends the same notices as a disconnect
        let previous = self.roles.remove(&conn).unwrap_or_default();
        let same_device = previous
            .as_device()
            .map(|session| session.identity == identity)
            .unwrap_or(false);
        if !same_device {
            self.release(conn, &previous);
        }
        self.rooms.leave_all(conn);

        let device_room = RoomName::device(&identity);
        for stale in self.rooms.members(&device_room) {
            self.evict(stale);
        }

        self.rooms.join(conn, device_room);
        let session = DeviceSession::new(identity.clone(), descriptor);
        self.roles
            .insert(conn, ConnectionRole::Device(session.clone()));

        tracing::info!(connection_id = %conn, device = %identity, "Device registered");

        let app_room = RoomName::app_hooks(&identity);
        self.rooms.broadcast(
            &app_room,
            ServerEvent::DeviceOnline {
                id: identity.clone(),
                connection: conn,
                descriptor: session.descriptor.clone(),
            },
        );

        // Let the new device learn about apps that hooked it before it came up
        for app_conn in self.rooms.members(&app_room) {
            if let Some(app) = self.roles.get(&app_conn).and_then(ConnectionRole::as_app) {
                self.rooms.send_to(
                    conn,
                    ServerEvent::AddApp {
                        name: app.name.clone(),
                        connection: app_conn,
                    },
                );
            }
        }

        Ok(session)
    }

    /// Set the display name of an app, promoting the connection if needed
    pub fn register_app_name(&mut self, conn: ConnectionId, name: &str) -> String {
        let name: String = name.chars().take(MAX_APP_NAME_LEN).collect();

        if !matches!(self.roles.get(&conn), Some(ConnectionRole::App(_))) {
            let previous = self.roles.remove(&conn).unwrap_or_default();
            self.release(conn, &previous);
            self.rooms.leave_all(conn);
            self.roles
                .insert(conn, ConnectionRole::App(AppSession::default()));
        }

        let Some(ConnectionRole::App(app)) = self.roles.get_mut(&conn) else {
            return name;
        };
        let old_name = std::mem::replace(&mut app.name, name.clone());
        let hooked = app.hooked().to_vec();

        if !old_name.is_empty() {
            self.rooms.leave(conn, &RoomName::app_name(&old_name));
        }
        if !name.is_empty() {
            self.rooms.join(conn, RoomName::app_name(&name));
        }

        for identity in &hooked {
            self.rooms.broadcast(
                &RoomName::device(identity),
                ServerEvent::AddApp {
                    name: name.clone(),
                    connection: conn,
                },
            );
        }

        tracing::debug!(connection_id = %conn, name = %name, hooked = hooked.len(), "App named");
        name
    }

    /// Hook an app to devices; invalid ids are skipped
    ///
    /// Returns the app's hooked set after the change.
    pub fn hookup(
        &mut self,
        conn: ConnectionId,
        raw_ids: &[String],
    ) -> Result<Vec<DeviceIdentity>, ValidationError> {
        let identities: Vec<DeviceIdentity> = raw_ids
            .iter()
            .filter_map(|raw| match self.normalize(raw) {
                Ok(identity) => Some(identity),
                Err(e) => {
                    tracing::debug!(connection_id = %conn, raw_id = %raw, error = %e, "Skipping invalid hookup id");
                    None
                }
            })
            .collect();

        let app = self.app_session_mut(conn)?;
        let name = app.name.clone();
        let added: Vec<DeviceIdentity> = identities
            .into_iter()
            .filter(|identity| app.hook(identity.clone()))
            .collect();
        let hooked = app.hooked().to_vec();

        for identity in added {
            self.rooms.join(conn, RoomName::app_hooks(&identity));

            let device_room = RoomName::device(&identity);
            self.rooms.broadcast(
                &device_room,
                ServerEvent::AddApp {
                    name: name.clone(),
                    connection: conn,
                },
            );

            // The device may already be online
            for device_conn in self.rooms.members(&device_room) {
                if let Some(device) = self.roles.get(&device_conn).and_then(ConnectionRole::as_device) {
                    self.rooms.send_to(
                        conn,
                        ServerEvent::DeviceOnline {
                            id: identity.clone(),
                            connection: device_conn,
                            descriptor: device.descriptor.clone(),
                        },
                    );
                }
            }

            tracing::debug!(connection_id = %conn, device = %identity, "Hooked up");
        }

        Ok(hooked)
    }

    /// Unhook an app from devices; an empty list unhooks everything
    pub fn hookdown(
        &mut self,
        conn: ConnectionId,
        raw_ids: &[String],
    ) -> Result<Vec<DeviceIdentity>, ValidationError> {
        let requested: Vec<DeviceIdentity> = raw_ids
            .iter()
            .filter_map(|raw| self.policy.normalize(raw).ok())
            .collect();

        let app = self.app_session_mut(conn)?;
        let targets = if raw_ids.is_empty() {
            app.hooked().to_vec()
        } else {
            requested
        };

        let name = app.name.clone();
        let removed: Vec<DeviceIdentity> = targets
            .into_iter()
            .filter(|identity| app.unhook(identity))
            .collect();
        let hooked = app.hooked().to_vec();

        for identity in removed {
            self.rooms.leave(conn, &RoomName::app_hooks(&identity));
            self.rooms.broadcast(
                &RoomName::device(&identity),
                ServerEvent::AppOffline {
                    name: name.clone(),
                    connection: conn,
                },
            );
            tracing::debug!(connection_id = %conn, device = %identity, "Hooked down");
        }

        Ok(hooked)
    }

    /// Drop all state of a closed connection, notifying the other side
    pub fn on_disconnect(&mut self, conn: ConnectionId) -> Option<ConnectionRole> {
        let role = self.roles.remove(&conn);
        if let Some(role) = &role {
            self.release(conn, role);
        }
        self.rooms.leave_all(conn);
        role
    }

    /// The device session of `conn`, unless it was evicted
    pub fn current_device(&self, conn: ConnectionId) -> Option<&DeviceSession> {
        let session = self.roles.get(&conn)?.as_device()?;
        self.rooms
            .is_member(conn, &RoomName::device(&session.identity))
            .then_some(session)
    }

    pub fn current_device_mut(&mut self, conn: ConnectionId) -> Option<&mut DeviceSession> {
        match self.roles.get_mut(&conn) {
            Some(ConnectionRole::Device(session))
                if self
                    .rooms
                    .is_member(conn, &RoomName::device(&session.identity)) =>
            {
                Some(session)
            }
            _ => None,
        }
    }

    /// The live device registered under an identity
    pub fn device_online(&self, identity: &DeviceIdentity) -> Option<(ConnectionId, &DeviceSession)> {
        self.rooms
            .members(&RoomName::device(identity))
            .into_iter()
            .find_map(|conn| {
                let session = self.roles.get(&conn)?.as_device()?;
                (session.identity == *identity).then_some((conn, session))
            })
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            connections: self.roles.len(),
            rooms: self.rooms.room_count(),
            ..RegistryStats::default()
        };
        for role in self.roles.values() {
            match role {
                ConnectionRole::Unassigned => stats.unassigned += 1,
                ConnectionRole::Device(_) => stats.devices += 1,
                ConnectionRole::App(_) => stats.apps += 1,
            }
        }
        stats
    }

    /// App session of `conn`; an unassigned connection becomes a nameless app
    fn app_session_mut(&mut self, conn: ConnectionId) -> Result<&mut AppSession, ValidationError> {
        let role = self.roles.entry(conn).or_default();
        if let ConnectionRole::Unassigned = role {
            *role = ConnectionRole::App(AppSession::default());
        }
        match role {
            ConnectionRole::App(app) => Ok(app),
            other => Err(ValidationError::WrongRole {
                expected: "app",
                actual: other.kind(),
            }),
        }
    }

    fn release(&self, conn: ConnectionId, role: &ConnectionRole) {
        match role {
            ConnectionRole::Unassigned => {}
            ConnectionRole::Device(device) => {
                self.rooms.broadcast(
                    &RoomName::app_hooks(&device.identity),
                    ServerEvent::DeviceOffline {
                        id: device.identity.clone(),
                        connection: conn,
                    },
                );
                tracing::info!(connection_id = %conn, device = %device.identity, "Device offline");
            }
            ConnectionRole::App(app) => {
                for identity in app.hooked() {
                    self.rooms.broadcast(
                        &RoomName::device(identity),
                        ServerEvent::AppOffline {
                            name: app.name.clone(),
                            connection: conn,
                        },
                    );
                }
                tracing::debug!(connection_id = %conn, name = %app.name, "App offline");
            }
        }
    }

    fn evict(&mut self, stale: ConnectionId) {
        tracing::info!(connection_id = %stale, "Evicting device connection");
        self.rooms.connections().disconnect(stale);
        self.rooms.leave_all(stale);
    }
}
