//! Relay core: identities, rooms, roles and protocol routing
//!
//! Layering, leaf first:
//! - [`identity`] normalizes device ids at ingress
//! - [`rooms`] holds named groups of connections and fans events out
//! - [`registry`] owns the role of every connection on top of the rooms
//! - [`router`] implements the protocol handlers against the registry

pub mod descriptor;
pub mod error;
pub mod identity;
pub mod registry;
pub mod rooms;
pub mod router;
pub mod session;

pub use descriptor::{BatteryReport, Capability, DeviceDescriptor};
pub use error::{RelayError, RelayResult, RoutingError, ValidationError};
pub use identity::{DeviceIdentity, IdentityPolicy};
pub use registry::{ConnectionRegistry, RegistryStats};
pub use rooms::{RoomBroadcaster, RoomName};
pub use router::RelayRouter;
pub use session::{AppSession, ConnectionRole, DeviceSession};
