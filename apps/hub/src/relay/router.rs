//! Protocol handlers
//!
//! [`RelayRouter::dispatch`] takes a parsed request from one connection and
//! runs it to completion against the registry. The caller serializes calls,
//! so a handler never observes another handler's intermediate state.

use serde_json::{json, Value};
use std::time::Instant;

use vibhub_command_codec::{PwmAll, PwmSpecific};

use super::descriptor::DeviceDescriptor;
use super::error::{RelayResult, RoutingError, ValidationError};
use super::identity::{DeviceIdentity, IdentityPolicy};
use super::registry::{ConnectionRegistry, RegistryStats};
use super::rooms::RoomName;
use super::session::{AppSession, ConnectionRole};
use crate::websocket::connection::{ConnectionId, ConnectionManager};
use crate::websocket::messages::{events, BatteryReading, ClientRequest, ServerEvent};

/// Routes client requests between apps and devices
#[derive(Debug)]
pub struct RelayRouter {
    registry: ConnectionRegistry,
}

impl RelayRouter {
    pub fn new(connections: ConnectionManager, policy: IdentityPolicy) -> Self {
        Self {
            registry: ConnectionRegistry::new(connections, policy),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ConnectionRegistry {
        &mut self.registry
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    pub fn on_connect(&mut self, conn: ConnectionId) {
        self.registry.on_connect(conn);
    }

    pub fn on_disconnect(&mut self, conn: ConnectionId) {
        if let Some(role) = self.registry.on_disconnect(conn) {
            tracing::debug!(connection_id = %conn, role = role.kind(), "Connection released");
        }
    }

    /// Handle one request; `Ok(None)` means there is nothing to answer with
    pub fn dispatch(
        &mut self,
        conn: ConnectionId,
        request: ClientRequest,
    ) -> RelayResult<Option<Value>> {
        match request {
            ClientRequest::RegisterDevice { id, descriptor } => {
                let session = self.registry.register_device(conn, &id, descriptor)?;
                Ok(Some(json!({
                    "id": session.identity,
                    "device": session.descriptor.export(),
                })))
            }
            ClientRequest::RegisterApp { name } => {
                self.registry.register_app_name(conn, &name);
                Ok(None)
            }
            ClientRequest::Hookup { ids } => {
                let hooked = self.registry.hookup(conn, &ids)?;
                Ok(Some(json!(hooked)))
            }
            ClientRequest::Hookdown { ids } => {
                let hooked = self.registry.hookdown(conn, &ids)?;
                Ok(Some(json!(hooked)))
            }
            ClientRequest::Pwm { hex } => {
                self.pwm_all(conn, &hex)?;
                Ok(None)
            }
            ClientRequest::PwmSpecific { hex } => {
                self.pwm_specific(conn, &hex)?;
                Ok(None)
            }
            ClientRequest::CustomToDevice { target, payload } => {
                self.custom_to_device(conn, &target, payload)?;
                Ok(None)
            }
            ClientRequest::CustomToApp { target, payload } => {
                self.custom_to_app(conn, &target, payload)?;
                Ok(None)
            }
            ClientRequest::BatteryStatus(reading) => {
                self.battery_status(conn, reading)?;
                Ok(None)
            }
            ClientRequest::BatteryRequest { id } => {
                self.battery_request(conn, &id)?;
                Ok(None)
            }
            ClientRequest::Whois { id } => Ok(Some(self.whois(&id)?)),
            ClientRequest::Get { id, kind, data } => {
                Ok(Some(self.handle_request(&id, &kind, data)?))
            }
        }
    }

    /// Forward a `p` command to the device at the encoded index
    pub fn pwm_all(&self, conn: ConnectionId, hex: &str) -> RelayResult<usize> {
        let command = PwmAll::decode(hex).map_err(RoutingError::from)?;
        let identity = self.hooked_device_at(conn, command.device_index)?;
        Ok(self.registry.rooms().broadcast(
            &RoomName::device(&identity),
            ServerEvent::Pwm(command.device_payload()),
        ))
    }

    /// Forward a `ps` command to the device at the encoded index
    pub fn pwm_specific(&self, conn: ConnectionId, hex: &str) -> RelayResult<usize> {
        let command = PwmSpecific::decode(hex).map_err(RoutingError::from)?;
        let identity = self.hooked_device_at(conn, command.device_index)?;
        let payload = command.device_payload().map_err(RoutingError::from)?;
        Ok(self.registry.rooms().broadcast(
            &RoomName::device(&identity),
            ServerEvent::PwmSpecific(payload),
        ))
    }

    /// App -> hooked device
    pub fn custom_to_device(
        &self,
        conn: ConnectionId,
        target: &str,
        payload: Value,
    ) -> RelayResult<usize> {
        let app = self.app(conn)?;
        let identity = self
            .registry
            .normalize(target)
            .ok()
            .filter(|identity| app.is_hooked(identity))
            .ok_or_else(|| RoutingError::NotHooked(target.to_string()))?;

        Ok(self.registry.rooms().broadcast(
            &RoomName::device(&identity),
            ServerEvent::CustomToDevice {
                payload,
                app_name: app.name.clone(),
                connection: conn,
            },
        ))
    }

    /// Device -> one app that hooked it
    pub fn custom_to_app(
        &self,
        conn: ConnectionId,
        target: &str,
        payload: Value,
    ) -> RelayResult<bool> {
        let device = self
            .registry
            .current_device(conn)
            .ok_or(RoutingError::NotADevice)?;
        let app_conn = self.hooking_app(target, &device.identity)?;

        Ok(self.registry.rooms().send_to(
            app_conn,
            ServerEvent::CustomToApp {
                id: device.identity.clone(),
                connection: conn,
                payload,
            },
        ))
    }

    /// Record a device's battery reading and notify apps
    pub fn battery_status(&mut self, conn: ConnectionId, reading: BatteryReading) -> RelayResult<usize> {
        self.battery_status_at(Instant::now(), conn, reading)
    }

    /// Same as [`RelayRouter::battery_status`] with an explicit clock
    ///
    /// A reading addressed to an app that hooked the device answers a `gb`
    /// request and goes to that app alone, bypassing the throttle.
    pub fn battery_status_at(
        &mut self,
        now: Instant,
        conn: ConnectionId,
        reading: BatteryReading,
    ) -> RelayResult<usize> {
        let session = self
            .registry
            .current_device_mut(conn)
            .ok_or(RoutingError::NotADevice)?;
        let notify = session.record_battery_at(now, reading.low, reading.mv, reading.xv);
        let report = session.battery_report();
        let identity = session.identity.clone();

        if let Some(target) = reading.app.as_deref() {
            match self.hooking_app(target, &identity) {
                Ok(app_conn) => {
                    let sent = self
                        .registry
                        .rooms()
                        .send_to(app_conn, ServerEvent::BatteryStatus(report));
                    return Ok(usize::from(sent));
                }
                Err(e) => {
                    tracing::debug!(connection_id = %conn, app = %target, error = %e, "Battery reply target rejected");
                }
            }
        }

        if !notify {
            tracing::trace!(connection_id = %conn, device = %identity, "Battery update throttled");
            return Ok(0);
        }

        Ok(self.registry.rooms().broadcast(
            &RoomName::app_hooks(&identity),
            ServerEvent::BatteryStatus(report),
        ))
    }

    /// Ask a hooked device for its battery state
    pub fn battery_request(&self, conn: ConnectionId, target: &str) -> RelayResult<usize> {
        let app = self.app(conn)?;
        let identity = self
            .registry
            .normalize(target)
            .ok()
            .filter(|identity| app.is_hooked(identity))
            .ok_or_else(|| RoutingError::NotHooked(target.to_string()))?;

        Ok(self.registry.rooms().broadcast(
            &RoomName::device(&identity),
            ServerEvent::BatteryRequest { app: conn },
        ))
    }

    pub fn whois(&self, id: &str) -> Result<Value, ValidationError> {
        self.handle_request(id, events::WHOIS, Value::Null)
    }

    /// Entry point shared by the socket `GET` event and the HTTP api
    pub fn handle_request(&self, id: &str, kind: &str, data: Value) -> Result<Value, ValidationError> {
        let identity = self.registry.normalize(id)?;

        match kind {
            events::VIB => {
                if !data.is_array() {
                    return Err(ValidationError::ExpectedArray("data"));
                }
                let delivered = self
                    .registry
                    .rooms()
                    .broadcast(&RoomName::device(&identity), ServerEvent::Vib(data));
                tracing::debug!(device = %identity, delivered, "Program sent");
                Ok(Value::String("OK".to_string()))
            }
            events::WHOIS => Ok(self
                .registry
                .device_online(&identity)
                .map(|(_, session)| session.descriptor.export())
                .unwrap_or_else(|| DeviceDescriptor::default().export())),
            other => Err(ValidationError::UnknownRequestType(other.to_string())),
        }
    }

    fn app(&self, conn: ConnectionId) -> Result<&AppSession, RoutingError> {
        self.registry
            .role(conn)
            .and_then(ConnectionRole::as_app)
            .ok_or(RoutingError::NotAnApp)
    }

    fn hooked_device_at(&self, conn: ConnectionId, index: u8) -> Result<DeviceIdentity, RoutingError> {
        self.app(conn)?
            .device_at(index)
            .cloned()
            .ok_or(RoutingError::UnknownDeviceIndex(index))
    }

    /// Resolve an app connection id that has hooked `identity`
    fn hooking_app(&self, target: &str, identity: &DeviceIdentity) -> Result<ConnectionId, RoutingError> {
        let unknown = || RoutingError::UnknownApp(target.to_string());
        let app_conn: ConnectionId = target.parse().map_err(|_| unknown())?;
        let hooked = self
            .registry
            .role(app_conn)
            .and_then(ConnectionRole::as_app)
            .map(|app| app.is_hooked(identity))
            .unwrap_or(false);
        if hooked {
            Ok(app_conn)
        } else {
            Err(unknown())
        }
    }
}
