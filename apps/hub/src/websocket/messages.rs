//! WebSocket message types for the relay protocol
//!
//! Every frame is a JSON text message. Clients send
//! `{"event": "...", "data": ..., "ack": n}`; the hub sends events as
//! `{"event": "...", "args": [...]}` and replies to acknowledged requests
//! with `{"ack": n, "success": bool, "message": ...}`.
//!
//! Client payloads are loosely typed (a hookup may carry one id or a list,
//! a registration may be a bare id or an object with metadata). They are
//! parsed into [`ClientRequest`] here, before any routing happens.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

use super::connection::ConnectionId;
use crate::relay::descriptor::{coerce_int, is_truthy, BatteryReport, DeviceDescriptor};
use crate::relay::error::ValidationError;
use crate::relay::identity::DeviceIdentity;

/// Event names used on the wire
pub mod events {
    pub const PWM: &str = "p";
    pub const PWM_SPECIFIC: &str = "ps";
    pub const VIB: &str = "vib";
    pub const ADD_DEVICE: &str = "id";
    pub const ADD_APP: &str = "app";
    pub const WHOIS: &str = "whois";
    pub const APP_OFFLINE: &str = "app_offline";
    pub const HOOKUP: &str = "hookup";
    pub const HOOKDOWN: &str = "hookdown";
    pub const DEVICE_ONLINE: &str = "dev_online";
    pub const DEVICE_OFFLINE: &str = "dev_offline";
    pub const CUSTOM_TO_DEVICE: &str = "dCustom";
    pub const CUSTOM_TO_APP: &str = "aCustom";
    pub const GET: &str = "GET";
    pub const BATTERY_REQUEST: &str = "gb";
    pub const BATTERY_STATUS: &str = "sb";
    pub const HIGH_RES: &str = "h";

    /// Every task name a device may advertise as a capability
    pub const ALL: &[&str] = &[
        PWM,
        PWM_SPECIFIC,
        VIB,
        ADD_DEVICE,
        ADD_APP,
        WHOIS,
        APP_OFFLINE,
        HOOKUP,
        HOOKDOWN,
        DEVICE_ONLINE,
        DEVICE_OFFLINE,
        CUSTOM_TO_DEVICE,
        CUSTOM_TO_APP,
        GET,
        BATTERY_REQUEST,
        BATTERY_STATUS,
        HIGH_RES,
    ];
}

// =============================================================================
// Client -> Server Messages
// =============================================================================

/// Raw frame as received from a client
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    /// Correlation id; when present the hub answers with an [`AckFrame`]
    #[serde(default)]
    pub ack: Option<u64>,
}

/// Battery reading reported by a device
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryReading {
    pub low: bool,
    pub mv: i64,
    pub xv: i64,
    /// App connection that asked for this reading, if any
    pub app: Option<String>,
}

/// A client message after boundary parsing
#[derive(Debug, Clone, PartialEq)]
pub enum ClientRequest {
    /// Device registration (`id`)
    RegisterDevice {
        id: String,
        descriptor: DeviceDescriptor,
    },
    /// App naming (`app`)
    RegisterApp { name: String },
    Hookup { ids: Vec<String> },
    /// An empty list removes every hooked device
    Hookdown { ids: Vec<String> },
    Pwm { hex: String },
    PwmSpecific { hex: String },
    CustomToDevice { target: String, payload: Value },
    CustomToApp { target: String, payload: Value },
    BatteryStatus(BatteryReading),
    BatteryRequest { id: String },
    Whois { id: String },
    /// REST-equivalent request (`GET`)
    Get { id: String, kind: String, data: Value },
}

impl ClientRequest {
    /// Parse an event name and its payload into a typed request
    pub fn parse(event: &str, data: Value) -> Result<Self, ValidationError> {
        match event {
            events::ADD_DEVICE => parse_registration(data),
            events::ADD_APP => Ok(Self::RegisterApp {
                name: expect_string(data, "name")?,
            }),
            events::HOOKUP => Ok(Self::Hookup {
                ids: string_list(data)?,
            }),
            events::HOOKDOWN => Ok(Self::Hookdown {
                ids: string_list(data)?,
            }),
            events::PWM => Ok(Self::Pwm {
                hex: expect_string(data, "data")?,
            }),
            events::PWM_SPECIFIC => Ok(Self::PwmSpecific {
                hex: expect_string(data, "data")?,
            }),
            events::CUSTOM_TO_DEVICE => {
                let (target, payload) = target_and_payload(data)?;
                Ok(Self::CustomToDevice { target, payload })
            }
            events::CUSTOM_TO_APP => {
                let (target, payload) = target_and_payload(data)?;
                Ok(Self::CustomToApp { target, payload })
            }
            events::BATTERY_STATUS => parse_battery(data),
            events::BATTERY_REQUEST => Ok(Self::BatteryRequest {
                id: id_or_object(data)?,
            }),
            events::WHOIS => Ok(Self::Whois {
                id: id_or_object(data)?,
            }),
            events::GET => parse_get(data),
            other => Err(ValidationError::UnknownEvent(other.to_string())),
        }
    }
}

fn parse_registration(data: Value) -> Result<ClientRequest, ValidationError> {
    match data {
        Value::String(id) => Ok(ClientRequest::RegisterDevice {
            id,
            descriptor: DeviceDescriptor::default(),
        }),
        Value::Object(ref map) => {
            let id = map
                .get("id")
                .and_then(Value::as_str)
                .ok_or(ValidationError::ExpectedString("id"))?
                .to_string();
            Ok(ClientRequest::RegisterDevice {
                id,
                descriptor: DeviceDescriptor::from_value(&data),
            })
        }
        _ => Err(ValidationError::ExpectedString("id")),
    }
}

fn parse_battery(data: Value) -> Result<ClientRequest, ValidationError> {
    let Value::Object(map) = data else {
        return Err(ValidationError::InvalidPayload(
            "battery status must be an object".to_string(),
        ));
    };

    let xv = map.get("xv").or_else(|| map.get("mx"));
    Ok(ClientRequest::BatteryStatus(BatteryReading {
        low: map.get("low").map(is_truthy).unwrap_or(false),
        mv: map.get("mv").and_then(coerce_int).unwrap_or(0),
        xv: xv.and_then(coerce_int).unwrap_or(0),
        app: map
            .get("app")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from),
    }))
}

fn parse_get(data: Value) -> Result<ClientRequest, ValidationError> {
    let Value::Object(mut map) = data else {
        return Err(ValidationError::InvalidPayload(
            "expected {id, type, data}".to_string(),
        ));
    };

    let id = take_string(&mut map, "id")?;
    let kind = take_string(&mut map, "type")?;
    let data = match map.remove("data") {
        Some(Value::String(raw)) => parse_json_or_string(raw),
        Some(other) => other,
        None => Value::Null,
    };
    Ok(ClientRequest::Get { id, kind, data })
}

/// Request data sent as JSON text; unparseable text is kept as a string
pub fn parse_json_or_string(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

fn take_string(
    map: &mut serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<String, ValidationError> {
    match map.remove(field) {
        Some(Value::String(s)) => Ok(s),
        _ => Err(ValidationError::ExpectedString(field)),
    }
}

fn expect_string(data: Value, field: &'static str) -> Result<String, ValidationError> {
    match data {
        Value::String(s) => Ok(s),
        _ => Err(ValidationError::ExpectedString(field)),
    }
}

/// Accepts `"id"` or `{"id": "..."}`
fn id_or_object(data: Value) -> Result<String, ValidationError> {
    match data {
        Value::String(s) => Ok(s),
        Value::Object(mut map) => take_string(&mut map, "id"),
        _ => Err(ValidationError::ExpectedString("id")),
    }
}

/// Accepts a single id or a list; non-string list entries are skipped
fn string_list(data: Value) -> Result<Vec<String>, ValidationError> {
    match data {
        Value::String(s) => Ok(vec![s]),
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect()),
        _ => Err(ValidationError::ExpectedStringOrArray("ids")),
    }
}

/// Accepts `[target, payload]` or `{"id": target, "data": payload}`
fn target_and_payload(data: Value) -> Result<(String, Value), ValidationError> {
    match data {
        Value::Array(items) => {
            let mut items = items.into_iter();
            let target = match items.next() {
                Some(Value::String(s)) => s,
                _ => return Err(ValidationError::ExpectedString("target")),
            };
            Ok((target, items.next().unwrap_or(Value::Null)))
        }
        Value::Object(mut map) => {
            let target = take_string(&mut map, "id")?;
            Ok((target, map.remove("data").unwrap_or(Value::Null)))
        }
        _ => Err(ValidationError::InvalidPayload(
            "expected [target, payload] or {id, data}".to_string(),
        )),
    }
}

// =============================================================================
// Server -> Client Messages
// =============================================================================

/// Events pushed from the hub to clients
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A hooked device came online (to apps)
    DeviceOnline {
        id: DeviceIdentity,
        connection: ConnectionId,
        descriptor: DeviceDescriptor,
    },
    /// A hooked device went offline (to apps)
    DeviceOffline {
        id: DeviceIdentity,
        connection: ConnectionId,
    },
    /// An app hooked up or renamed itself (to devices)
    AddApp {
        name: String,
        connection: ConnectionId,
    },
    /// An app unhooked or disconnected (to devices)
    AppOffline {
        name: String,
        connection: ConnectionId,
    },
    /// Hex intensities for every port (to a device)
    Pwm(String),
    /// Hex `(port, intensity)` pairs (to a device)
    PwmSpecific(String),
    /// REST-originated program (to a device)
    Vib(Value),
    CustomToDevice {
        payload: Value,
        app_name: String,
        connection: ConnectionId,
    },
    CustomToApp {
        id: DeviceIdentity,
        connection: ConnectionId,
        payload: Value,
    },
    /// Battery state of a device (to apps)
    BatteryStatus(BatteryReport),
    /// Battery query on behalf of an app (to a device)
    BatteryRequest { app: ConnectionId },
}

impl ServerEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeviceOnline { .. } => events::DEVICE_ONLINE,
            Self::DeviceOffline { .. } => events::DEVICE_OFFLINE,
            Self::AddApp { .. } => events::ADD_APP,
            Self::AppOffline { .. } => events::APP_OFFLINE,
            Self::Pwm(_) => events::PWM,
            Self::PwmSpecific(_) => events::PWM_SPECIFIC,
            Self::Vib(_) => events::VIB,
            Self::CustomToDevice { .. } => events::CUSTOM_TO_DEVICE,
            Self::CustomToApp { .. } => events::CUSTOM_TO_APP,
            Self::BatteryStatus(_) => events::BATTERY_STATUS,
            Self::BatteryRequest { .. } => events::BATTERY_REQUEST,
        }
    }

    /// Positional arguments sent with the event
    pub fn args(&self) -> Vec<Value> {
        match self {
            Self::DeviceOnline {
                id,
                connection,
                descriptor,
            } => vec![json!(id), json!(connection), descriptor.export()],
            Self::DeviceOffline { id, connection } => vec![json!(id), json!(connection)],
            Self::AddApp { name, connection } | Self::AppOffline { name, connection } => {
                vec![json!(name), json!(connection)]
            }
            Self::Pwm(hex) | Self::PwmSpecific(hex) => vec![json!(hex)],
            Self::Vib(data) => vec![data.clone()],
            Self::CustomToDevice {
                payload,
                app_name,
                connection,
            } => vec![payload.clone(), json!(app_name), json!(connection)],
            Self::CustomToApp {
                id,
                connection,
                payload,
            } => vec![json!(id), json!(connection), payload.clone()],
            Self::BatteryStatus(report) => vec![json!(report)],
            Self::BatteryRequest { app } => vec![json!(app)],
        }
    }
}

impl Serialize for ServerEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ServerEvent", 2)?;
        state.serialize_field("event", self.name())?;
        state.serialize_field("args", &self.args())?;
        state.end()
    }
}

/// Reply to an acknowledged client request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AckFrame {
    pub ack: u64,
    pub success: bool,
    pub message: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl AckFrame {
    pub fn success(ack: u64, message: Value) -> Self {
        Self {
            ack,
            success: true,
            message,
            code: None,
        }
    }

    pub fn failure(ack: u64, error: &ValidationError) -> Self {
        Self {
            ack,
            success: false,
            message: Value::String(error.to_string()),
            code: Some(error.code()),
        }
    }
}

/// Anything queued on a connection's outbound channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Event(ServerEvent),
    Ack(AckFrame),
}

impl From<ServerEvent> for ServerFrame {
    fn from(event: ServerEvent) -> Self {
        Self::Event(event)
    }
}
