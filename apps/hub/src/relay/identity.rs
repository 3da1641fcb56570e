//! Device identity normalization
//!
//! Identities are normalized once, when a message enters the relay. Every
//! comparison, room name and stored session uses the normalized form.

use serde::Serialize;
use std::fmt;

use super::error::ValidationError;

/// Shortest accepted device id by default
pub const DEFAULT_MIN_ID_LEN: usize = 3;

/// Longest accepted device id by default
pub const DEFAULT_MAX_ID_LEN: usize = 128;

/// A validated, normalized device identifier
///
/// Only [`IdentityPolicy::normalize`] creates these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Rules applied to raw device ids at ingress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityPolicy {
    pub min_len: usize,
    pub max_len: usize,
    pub case_sensitive: bool,
}

impl Default for IdentityPolicy {
    fn default() -> Self {
        Self {
            min_len: DEFAULT_MIN_ID_LEN,
            max_len: DEFAULT_MAX_ID_LEN,
            case_sensitive: false,
        }
    }
}

impl IdentityPolicy {
    pub fn new(min_len: usize, max_len: usize, case_sensitive: bool) -> Self {
        Self {
            min_len,
            max_len,
            case_sensitive,
        }
    }

    /// Case-fold (unless case sensitive) and bounds-check a raw id
    pub fn normalize(&self, raw: &str) -> Result<DeviceIdentity, ValidationError> {
        let normalized = if self.case_sensitive {
            raw.to_string()
        } else {
            raw.to_lowercase()
        };

        let len = normalized.chars().count();
        if len < self.min_len {
            return Err(ValidationError::IdentityTooShort {
                len,
                min: self.min_len,
            });
        }
        if len > self.max_len {
            return Err(ValidationError::IdentityTooLong {
                len,
                max: self.max_len,
            });
        }

        Ok(DeviceIdentity(normalized))
    }
}
