//! Sensor identification records

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::protocol::ProtocolError;

/// Length of a version response payload
pub const VERSION_PAYLOAD_LEN: usize = 16;

/// Hardware and firmware version reported by the sensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub hardware: u16,
    pub firmware_major: u8,
    pub firmware_minor: u8,
    pub firmware_build: u16,
    /// Firmware type as sent; not necessarily NUL-terminated
    pub firmware_type: [u8; 10],
}

impl Version {
    /// Decode a version response payload
    pub fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() < VERSION_PAYLOAD_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: VERSION_PAYLOAD_LEN,
                actual: payload.len(),
            });
        }

        let mut firmware_type = [0u8; 10];
        firmware_type.copy_from_slice(&payload[6..16]);

        Ok(Self {
            hardware: LittleEndian::read_u16(&payload[0..2]),
            firmware_major: payload[2],
            firmware_minor: payload[3],
            firmware_build: LittleEndian::read_u16(&payload[4..6]),
            firmware_type,
        })
    }

    /// Firmware type up to the first NUL
    pub fn firmware_type_str(&self) -> String {
        let end = self
            .firmware_type
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.firmware_type.len());
        String::from_utf8_lossy(&self.firmware_type[..end]).into_owned()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hardware ver: 0x{:x} firmware ver: {}.{}.{} {}",
            self.hardware,
            self.firmware_major,
            self.firmware_minor,
            self.firmware_build,
            self.firmware_type_str()
        )
    }
}

/// Frame dimensions of the running program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u16,
    pub height: u16,
}

impl Resolution {
    pub fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() < 4 {
            return Err(ProtocolError::InvalidLength {
                expected: 4,
                actual: payload.len(),
            });
        }
        Ok(Self {
            width: LittleEndian::read_u16(&payload[0..2]),
            height: LittleEndian::read_u16(&payload[2..4]),
        })
    }
}
