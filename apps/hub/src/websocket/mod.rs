//! WebSocket transport for apps and devices
//!
//! Each socket gets a [`connection::ConnectionId`] and an outbound queue in
//! the [`connection::ConnectionManager`]. Inbound frames are parsed in
//! [`handler`] and passed to the relay router.

pub mod connection;
pub mod handler;
pub mod messages;

pub use connection::{ConnectionId, ConnectionManager};
pub use handler::ws_handler;
pub use messages::{ClientFrame, ClientRequest, ServerEvent, ServerFrame};
