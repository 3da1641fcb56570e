//! PWM command codec for the VibHub relay
//!
//! Apps drive device actuators by sending short hexadecimal strings. This
//! crate decodes and encodes the two formats the hub understands:
//!
//! - [`PwmAll`] (`p`): a device index followed by one intensity byte per port
//! - [`PwmSpecific`] (`ps`): a device index (with a high-resolution flag)
//!   followed by `(port, intensity)` pairs
//!
//! The first byte always addresses a device by its position in the sending
//! app's hooked-device list. The hub strips it before forwarding, so devices
//! only ever see [`PwmAll::device_payload`] / [`PwmSpecific::device_payload`].
//!
//! # Example
//!
//! ```rust
//! use vibhub_command_codec::{PwmAll, PwmSpecific};
//!
//! let command = PwmAll::decode("00ffffffff").unwrap();
//! assert_eq!(command.device_index, 0);
//! assert_eq!(command.device_payload(), "ffffffff");
//!
//! let specific = PwmSpecific::decode("80000fff").unwrap();
//! assert!(specific.high_res);
//! assert_eq!(specific.ports[0].intensity, 0x0fff);
//! ```

mod error;
mod hex_frame;
mod pwm;

pub use error::{CodecError, CodecResult};
pub use hex_frame::{decode_hex, MIN_HEX_LEN};
pub use pwm::{PortIntensity, PwmAll, PwmSpecific, DEVICE_INDEX_MASK, HIGH_RES_FLAG};
