//! Device metadata and battery telemetry
//!
//! Devices describe themselves when they register. The payload comes from
//! small firmware builds, so every field is coerced leniently: anything the
//! hub cannot make sense of falls back to a default instead of failing the
//! registration.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::identity::DeviceIdentity;
use crate::websocket::messages::events;

/// Maximum length of firmware and hardware version strings
pub const MAX_VERSION_LEN: usize = 64;

/// Maximum length of the free-form custom field
pub const MAX_CUSTOM_LEN: usize = 256;

/// Maximum length of a string capability value
pub const MAX_CAPABILITY_LEN: usize = 32;

/// Placeholder for unknown versions
pub const UNKNOWN_VERSION: &str = "???";

/// Minimum spacing between battery notifications to apps
pub const BATTERY_NOTIFY_INTERVAL: Duration = Duration::from_secs(10);

/// Value advertised for a supported task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Capability {
    Flag(bool),
    Custom(String),
}

/// Metadata a device sends with its registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub num_ports: u32,
    pub version: String,
    pub hw_version: String,
    pub custom: String,
    /// Lower-cased task name -> capability
    pub capabilities: BTreeMap<String, Capability>,
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self {
            num_ports: 0,
            version: UNKNOWN_VERSION.to_string(),
            hw_version: UNKNOWN_VERSION.to_string(),
            custom: String::new(),
            capabilities: BTreeMap::new(),
        }
    }
}

impl DeviceDescriptor {
    /// Build a descriptor from a registration object
    ///
    /// Non-object input yields the default descriptor.
    pub fn from_value(data: &Value) -> Self {
        let Some(map) = data.as_object() else {
            return Self::default();
        };

        let num_ports = map
            .get("numPorts")
            .and_then(coerce_int)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0);

        let text = |key: &str, max: usize| {
            map.get(key)
                .and_then(coerce_string)
                .map(|s| truncate(&s, max))
        };

        let capabilities: BTreeMap<String, Capability> = map
            .get("capabilities")
            .and_then(Value::as_object)
            .map(|caps| {
                caps.iter()
                    .filter_map(|(task, value)| {
                        let task = task.to_lowercase();
                        // Case-insensitive so the mixed-case tasks (dCustom, aCustom, GET) are kept
                        let known = events::ALL.iter().any(|t| t.eq_ignore_ascii_case(&task));
                        known.then(|| (task, parse_capability(value)))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            num_ports,
            version: text("version", MAX_VERSION_LEN)
                .unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            hw_version: text("hwversion", MAX_VERSION_LEN)
                .unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            custom: text("custom", MAX_CUSTOM_LEN).unwrap_or_default(),
            capabilities,
        }
    }

    /// Public view sent to apps and returned by whois
    pub fn export(&self) -> Value {
        json!({
            "hwversion": self.hw_version,
            "numPorts": self.num_ports,
            "version": self.version,
            "custom": self.custom,
            "capabilities": self.capabilities,
        })
    }
}

fn parse_capability(value: &Value) -> Capability {
    match value {
        Value::String(s) => Capability::Custom(truncate(&s.to_lowercase(), MAX_CAPABILITY_LEN)),
        other => Capability::Flag(is_truthy(other)),
    }
}

/// Battery readings of one device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatteryState {
    last_accepted: Option<Instant>,
    last_accepted_at: Option<DateTime<Utc>>,
    pub low: bool,
    pub mv: i64,
    pub xv: i64,
}

impl BatteryState {
    /// Store a reading; returns true when apps should be notified
    pub fn record(&mut self, low: bool, mv: i64, xv: i64) -> bool {
        self.record_at(Instant::now(), low, mv, xv)
    }

    /// Same as [`BatteryState::record`] with an explicit clock
    ///
    /// Readings are always stored. The accepted timestamp only moves when at
    /// least [`BATTERY_NOTIFY_INTERVAL`] passed since the previous accepted
    /// reading.
    pub fn record_at(&mut self, now: Instant, low: bool, mv: i64, xv: i64) -> bool {
        self.low = low;
        self.mv = mv;
        self.xv = xv;

        let due = match self.last_accepted {
            Some(last) => now.saturating_duration_since(last) >= BATTERY_NOTIFY_INTERVAL,
            None => true,
        };

        if due {
            self.last_accepted = Some(now);
            self.last_accepted_at = Some(Utc::now());
        }
        due
    }

    pub fn report(&self, id: &DeviceIdentity) -> BatteryReport {
        BatteryReport {
            id: id.clone(),
            low: self.low,
            mv: self.mv,
            xv: self.xv,
            last: self
                .last_accepted_at
                .map(|at| at.timestamp())
                .unwrap_or(0),
        }
    }
}

/// Battery status as sent to apps
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatteryReport {
    pub id: DeviceIdentity,
    pub low: bool,
    pub mv: i64,
    pub xv: i64,
    /// Unix seconds of the last accepted reading
    pub last: i64,
}

/// Loose truthiness: null, false, 0, NaN and "" are false
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Integer from a number or the leading integer of a string
pub fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim_start();
            let (sign, digits) = match s.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, s.strip_prefix('+').unwrap_or(s)),
            };
            let end = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            digits[..end].parse::<i64>().ok().map(|n| sign * n)
        }
        _ => None,
    }
}

/// Text from a truthy scalar
fn coerce_string(value: &Value) -> Option<String> {
    if !is_truthy(value) {
        return None;
    }
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::identity::IdentityPolicy;

    #[test]
    fn test_default_descriptor_export() {
        let exported = DeviceDescriptor::default().export();
        assert_eq!(
            exported,
            json!({
                "hwversion": "???",
                "numPorts": 0,
                "version": "???",
                "custom": "",
                "capabilities": {},
            })
        );
    }

    #[test]
    fn test_descriptor_from_registration() {
        let descriptor = DeviceDescriptor::from_value(&json!({
            "id": "lamp",
            "numPorts": "4",
            "version": "1.2.0",
            "hwversion": 3,
            "custom": "x".repeat(300),
            "capabilities": {
                "P": true,
                "ps": 1,
                "vib": 0,
                "sb": "CUSTOM",
                "teleport": true,
                "dCustom": true,
            },
        }));

        assert_eq!(descriptor.num_ports, 4);
        assert_eq!(descriptor.version, "1.2.0");
        assert_eq!(descriptor.hw_version, "3");
        assert_eq!(descriptor.custom.len(), MAX_CUSTOM_LEN);
        assert_eq!(descriptor.capabilities.get("p"), Some(&Capability::Flag(true)));
        assert_eq!(descriptor.capabilities.get("ps"), Some(&Capability::Flag(true)));
        assert_eq!(descriptor.capabilities.get("vib"), Some(&Capability::Flag(false)));
        assert_eq!(
            descriptor.capabilities.get("sb"),
            Some(&Capability::Custom("custom".into()))
        );
        assert_eq!(
            descriptor.capabilities.get("dcustom"),
            Some(&Capability::Flag(true))
        );
        assert!(!descriptor.capabilities.contains_key("teleport"));
    }

    #[test]
    fn test_descriptor_truncates_versions() {
        let long = "v".repeat(100);
        let descriptor = DeviceDescriptor::from_value(&json!({"version": long, "hwversion": ""}));
        assert_eq!(descriptor.version.chars().count(), MAX_VERSION_LEN);
        assert_eq!(descriptor.hw_version, UNKNOWN_VERSION);
    }

    #[test]
    fn test_negative_ports_fall_back_to_zero() {
        let descriptor = DeviceDescriptor::from_value(&json!({"numPorts": -2}));
        assert_eq!(descriptor.num_ports, 0);
    }

    #[test]
    fn test_battery_throttling() {
        let mut battery = BatteryState::default();
        let start = Instant::now();

        assert!(battery.record_at(start, false, 3900, 4200));
        assert!(!battery.record_at(start + Duration::from_secs(3), true, 3400, 4200));
        // Readings are stored even when throttled
        assert!(battery.low);
        assert_eq!(battery.mv, 3400);
        assert!(battery.record_at(start + Duration::from_secs(11), true, 3300, 4200));
    }

    #[test]
    fn test_battery_interval_is_inclusive() {
        let mut battery = BatteryState::default();
        let start = Instant::now();
        assert!(battery.record_at(start, false, 1, 2));
        assert!(battery.record_at(start + BATTERY_NOTIFY_INTERVAL, false, 1, 2));
    }

    #[test]
    fn test_battery_report() {
        let id = IdentityPolicy::default().normalize("lamp").unwrap();
        let mut battery = BatteryState::default();
        assert_eq!(battery.report(&id).last, 0);

        battery.record(true, 3500, 4100);
        let report = battery.report(&id);
        assert!(report.low);
        assert_eq!(report.mv, 3500);
        assert_eq!(report.xv, 4100);
        assert!(report.last > 0);
    }

    #[test]
    fn test_coerce_int() {
        assert_eq!(coerce_int(&json!(42)), Some(42));
        assert_eq!(coerce_int(&json!(4.9)), Some(4));
        assert_eq!(coerce_int(&json!(" 12abc")), Some(12));
        assert_eq!(coerce_int(&json!("-7")), Some(-7));
        assert_eq!(coerce_int(&json!("abc")), None);
        assert_eq!(coerce_int(&json!(null)), None);
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("false")));
        assert!(is_truthy(&json!([])));
    }
}
