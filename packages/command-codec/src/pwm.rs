//! PWM-all and PWM-specific command formats

use crate::error::{CodecError, CodecResult};
use crate::hex_frame::decode_hex;

/// Bit in the index byte of a `ps` command marking 2-byte intensities
pub const HIGH_RES_FLAG: u8 = 0x80;

/// Bits of the index byte of a `ps` command that carry the device index
pub const DEVICE_INDEX_MASK: u8 = 0x7f;

/// Intensity update for every port of one device (`p`)
///
/// Wire layout: `[device_index, intensity_0, intensity_1, ...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PwmAll {
    /// Position of the target in the sender's hooked-device list
    pub device_index: u8,
    /// Per-port duty cycles (0-255), forwarded untouched
    pub intensities: Vec<u8>,
}

impl PwmAll {
    pub fn new(device_index: u8, intensities: impl Into<Vec<u8>>) -> Self {
        Self {
            device_index,
            intensities: intensities.into(),
        }
    }

    /// Decode a `p` command
    pub fn decode(input: &str) -> CodecResult<Self> {
        let bytes = decode_hex(input)?;
        // decode_hex guarantees at least two bytes
        let (index, intensities) = bytes.split_at(1);
        Ok(Self {
            device_index: index[0],
            intensities: intensities.to_vec(),
        })
    }

    /// Encode the full command, device index included
    pub fn encode(&self) -> String {
        let mut bytes = Vec::with_capacity(self.intensities.len() + 1);
        bytes.push(self.device_index);
        bytes.extend_from_slice(&self.intensities);
        hex::encode(bytes)
    }

    /// Hex payload delivered to the device (index byte stripped)
    pub fn device_payload(&self) -> String {
        hex::encode(&self.intensities)
    }
}

/// Intensity for a single addressed port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortIntensity {
    pub port: u8,
    pub intensity: u16,
}

impl PortIntensity {
    pub fn new(port: u8, intensity: u16) -> Self {
        Self { port, intensity }
    }
}

/// Intensity update for selected ports of one device (`ps`)
///
/// Wire layout: `[flag|device_index, port, intensity, port, intensity, ...]`
/// where each intensity is one byte, or two bytes big-endian when the
/// [`HIGH_RES_FLAG`] bit is set on the index byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PwmSpecific {
    /// Position of the target in the sender's hooked-device list (7 bits)
    pub device_index: u8,
    /// Intensities are 16 bit instead of 8 bit
    pub high_res: bool,
    pub ports: Vec<PortIntensity>,
}

impl PwmSpecific {
    /// Decode a `ps` command
    pub fn decode(input: &str) -> CodecResult<Self> {
        let bytes = decode_hex(input)?;
        let (head, body) = bytes.split_at(1);
        let high_res = head[0] & HIGH_RES_FLAG != 0;
        let width = Self::pair_width(high_res);

        if body.len() % width != 0 {
            return Err(CodecError::MisalignedPairs {
                len: body.len(),
                width,
            });
        }

        let ports = body
            .chunks_exact(width)
            .map(|pair| {
                let intensity = if high_res {
                    u16::from_be_bytes([pair[1], pair[2]])
                } else {
                    u16::from(pair[1])
                };
                PortIntensity::new(pair[0], intensity)
            })
            .collect();

        Ok(Self {
            device_index: head[0] & DEVICE_INDEX_MASK,
            high_res,
            ports,
        })
    }

    /// Encode the full command, index byte and flag included
    pub fn encode(&self) -> CodecResult<String> {
        if self.device_index & HIGH_RES_FLAG != 0 {
            return Err(CodecError::DeviceIndexOutOfRange(self.device_index));
        }

        let mut head = self.device_index;
        if self.high_res {
            head |= HIGH_RES_FLAG;
        }

        let mut bytes = vec![head];
        self.write_pairs(&mut bytes)?;
        Ok(hex::encode(bytes))
    }

    /// Hex payload delivered to the device (index byte stripped)
    pub fn device_payload(&self) -> CodecResult<String> {
        let mut bytes = Vec::with_capacity(self.ports.len() * Self::pair_width(self.high_res));
        self.write_pairs(&mut bytes)?;
        Ok(hex::encode(bytes))
    }

    fn write_pairs(&self, out: &mut Vec<u8>) -> CodecResult<()> {
        for entry in &self.ports {
            out.push(entry.port);
            if self.high_res {
                out.extend_from_slice(&entry.intensity.to_be_bytes());
            } else {
                let low = u8::try_from(entry.intensity).map_err(|_| {
                    CodecError::IntensityOutOfRange {
                        port: entry.port,
                        intensity: entry.intensity,
                    }
                })?;
                out.push(low);
            }
        }
        Ok(())
    }

    fn pair_width(high_res: bool) -> usize {
        if high_res {
            3
        } else {
            2
        }
    }
}
