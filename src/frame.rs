use serde::de::{self, Error as _};
use std::fmt::{self, Write as _};

use crate::error::{Error, Result};

/// Size of every request written to the mouse
pub const REQUEST_LEN: usize = 64;

/// Largest reply read back from the mouse
pub const MAX_RESPONSE_LEN: usize = 128;

/// The battery value is one byte, two hex digits
const VALUE_HEX_LEN: usize = 2;

/// Fixed 64-byte report written to the device.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RequestFrame([u8; REQUEST_LEN]);

impl RequestFrame {
    /// Battery status query: `50 02` followed by 62 zero bytes
    pub const BATTERY: Self = {
        let mut data = [0; REQUEST_LEN];
        data[0] = 0x50;
        data[1] = 0x02;
        Self(data)
    };

    pub const fn new(data: [u8; REQUEST_LEN]) -> Self {
        Self(data)
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex: String = hex.split_whitespace().collect();
        if hex.len() != REQUEST_LEN * 2 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }

        let mut data = [0; REQUEST_LEN];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(data))
    }

    pub fn as_bytes(&self) -> &[u8; REQUEST_LEN] {
        &self.0
    }
}

impl Default for RequestFrame {
    fn default() -> Self {
        Self::BATTERY
    }
}

impl fmt::Debug for RequestFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestFrame({})", to_hex(&self.0))
    }
}

// Hex string in config files, spaces allowed
impl serde::Serialize for RequestFrame {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_hex(&self.0).serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for RequestFrame {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).ok_or_else(|| {
            D::Error::invalid_value(de::Unexpected::Str(&hex), &"64 bytes of hex")
        })
    }
}

/// Bytes read back from the device for a single poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseFrame(Vec<u8>);

impl ResponseFrame {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }
}

/// Lowercase, zero padded, no separators.
pub fn to_hex(data: &[u8]) -> String {
    let mut hex = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(hex, "{:02x}", byte);
    }
    hex
}

/// Validate a response and pull the battery percentage out of it.
///
/// Matching and extraction work on the hex rendering of the frame, so
/// `marker` may straddle byte boundaries.
pub fn parse_battery(response: &ResponseFrame, marker: &str, value_offset: usize) -> Result<u8> {
    let hex = response.to_hex();

    if !hex.contains(marker) {
        return Err(Error::ProtocolMismatch {
            marker: marker.to_string(),
            hex,
        });
    }

    // Offsets come from config, so the arithmetic may overflow
    let end = value_offset
        .checked_mul(2)
        .and_then(|start| start.checked_add(VALUE_HEX_LEN));
    let end = match end {
        Some(end) if end <= hex.len() => end,
        _ => {
            return Err(Error::FrameTooShort {
                len: hex.len(),
                needed: end.unwrap_or(usize::MAX),
                hex,
            })
        }
    };
    let start = end - VALUE_HEX_LEN;

    let value_hex = &hex[start..end];
    let value = u32::from_str_radix(value_hex, 16).map_err(|_| Error::InvalidValue {
        value: value_hex.to_string(),
    })?;

    match value {
        1..=100 => Ok(value as u8),
        _ => Err(Error::ValueOutOfRange {
            value,
            value_hex: value_hex.to_string(),
            hex,
        }),
    }
}
