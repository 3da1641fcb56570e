//! Per-connection role state

use std::time::Instant;

use super::descriptor::{BatteryReport, BatteryState, DeviceDescriptor};
use super::identity::DeviceIdentity;

/// Longest app display name kept
pub const MAX_APP_NAME_LEN: usize = 128;

/// What a connection has identified itself as
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionRole {
    #[default]
    Unassigned,
    Device(DeviceSession),
    App(AppSession),
}

impl ConnectionRole {
    /// Short role name used in error messages and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unassigned => "unassigned",
            Self::Device(_) => "device",
            Self::App(_) => "app",
        }
    }

    pub fn as_device(&self) -> Option<&DeviceSession> {
        match self {
            Self::Device(session) => Some(session),
            _ => None,
        }
    }

    pub fn as_app(&self) -> Option<&AppSession> {
        match self {
            Self::App(session) => Some(session),
            _ => None,
        }
    }
}

/// State of a registered device connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSession {
    pub identity: DeviceIdentity,
    pub descriptor: DeviceDescriptor,
    pub battery: BatteryState,
}

impl DeviceSession {
    pub fn new(identity: DeviceIdentity, descriptor: DeviceDescriptor) -> Self {
        Self {
            identity,
            descriptor,
            battery: BatteryState::default(),
        }
    }

    /// Store a battery reading; true when apps should hear about it
    pub fn record_battery_at(&mut self, now: Instant, low: bool, mv: i64, xv: i64) -> bool {
        self.battery.record_at(now, low, mv, xv)
    }

    pub fn battery_report(&self) -> BatteryReport {
        self.battery.report(&self.identity)
    }
}

/// State of a controller connection
///
/// `hooked` keeps hookup order: the index byte of `p` and `ps` commands
/// addresses devices by their position in this list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppSession {
    pub name: String,
    hooked: Vec<DeviceIdentity>,
}

impl AppSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hooked: Vec::new(),
        }
    }

    /// Add a device; false if it was already hooked
    pub fn hook(&mut self, identity: DeviceIdentity) -> bool {
        if self.is_hooked(&identity) {
            return false;
        }
        self.hooked.push(identity);
        true
    }

    /// Remove a device; false if it was not hooked
    pub fn unhook(&mut self, identity: &DeviceIdentity) -> bool {
        let before = self.hooked.len();
        self.hooked.retain(|hooked| hooked != identity);
        self.hooked.len() != before
    }

    pub fn is_hooked(&self, identity: &DeviceIdentity) -> bool {
        self.hooked.contains(identity)
    }

    pub fn hooked(&self) -> &[DeviceIdentity] {
        &self.hooked
    }

    pub fn device_at(&self, index: u8) -> Option<&DeviceIdentity> {
        self.hooked.get(usize::from(index))
    }
}
