//! Codec error types

use thiserror::Error;

/// Errors produced while decoding or encoding PWM commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer than the minimum number of hex characters
    #[error("command too short: {len} hex characters (minimum {min})")]
    TooShort { len: usize, min: usize },

    /// Hex string does not describe whole bytes
    #[error("command has odd length: {0} hex characters")]
    OddLength(usize),

    /// Hex string contains characters outside `[0-9a-fA-F]`
    #[error("invalid hex in command: {0}")]
    InvalidHex(String),

    /// `(port, intensity)` pairs do not line up with the payload length
    #[error("{len} payload bytes cannot be split into {width}-byte port pairs")]
    MisalignedPairs { len: usize, width: usize },

    /// Intensity does not fit the selected resolution
    #[error("intensity {intensity} on port {port} exceeds the low resolution range")]
    IntensityOutOfRange { port: u8, intensity: u16 },

    /// Device index collides with the high resolution flag
    #[error("device index {0} does not fit in 7 bits")]
    DeviceIndexOutOfRange(u8),
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;
