//! Relay error types
//!
//! Validation errors go back to the caller that sent the message. Routing
//! errors are only logged: answering them would let a client probe which
//! devices and apps exist.

use thiserror::Error;
use vibhub_command_codec::CodecError;

/// Malformed request or identity, reported to the immediate caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("device id must be at least {min} characters (got {len})")]
    IdentityTooShort { len: usize, min: usize },

    #[error("device id must be at most {max} characters (got {len})")]
    IdentityTooLong { len: usize, max: usize },

    #[error("expected a string for '{0}'")]
    ExpectedString(&'static str),

    #[error("expected a string or an array for '{0}'")]
    ExpectedStringOrArray(&'static str),

    #[error("expected an array for '{0}'")]
    ExpectedArray(&'static str),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("unknown request type: {0}")]
    UnknownRequestType(String),

    #[error("connection is registered as {actual}, expected {expected}")]
    WrongRole {
        expected: &'static str,
        actual: &'static str,
    },
}

impl ValidationError {
    /// Error code string for client-side handling
    pub fn code(&self) -> &'static str {
        match self {
            Self::IdentityTooShort { .. } | Self::IdentityTooLong { .. } => "INVALID_DEVICE_ID",
            Self::ExpectedString(_) | Self::ExpectedStringOrArray(_) | Self::ExpectedArray(_) => {
                "TYPE_MISMATCH"
            }
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::UnknownEvent(_) => "UNKNOWN_EVENT",
            Self::UnknownRequestType(_) => "UNKNOWN_TYPE",
            Self::WrongRole { .. } => "WRONG_ROLE",
        }
    }
}

/// Message that cannot be delivered; dropped without a response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("sender is not an app")]
    NotAnApp,

    #[error("sender is not a device")]
    NotADevice,

    #[error("no hooked device at index {0}")]
    UnknownDeviceIndex(u8),

    #[error("device {0} is not hooked by the sender")]
    NotHooked(String),

    #[error("target connection {0} is not a hooked app")]
    UnknownApp(String),

    #[error("undecodable command: {0}")]
    Decode(#[from] CodecError),
}

/// Any failure while handling a relay message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Routing(#[from] RoutingError),
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;
