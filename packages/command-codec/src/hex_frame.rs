//! Hex string framing shared by both command formats

use crate::error::{CodecError, CodecResult};

/// Smallest accepted command: one index byte plus one payload byte
pub const MIN_HEX_LEN: usize = 4;

/// Decode a command string into raw bytes.
///
/// The string must be at least [`MIN_HEX_LEN`] characters, of even length,
/// and contain only hex digits (either case).
pub fn decode_hex(input: &str) -> CodecResult<Vec<u8>> {
    let len = input.len();
    if len < MIN_HEX_LEN {
        return Err(CodecError::TooShort {
            len,
            min: MIN_HEX_LEN,
        });
    }
    if len % 2 != 0 {
        return Err(CodecError::OddLength(len));
    }

    hex::decode(input).map_err(|e| CodecError::InvalidHex(e.to_string()))
}
