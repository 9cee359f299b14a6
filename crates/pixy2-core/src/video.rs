//! Video sampling

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::protocol::commands::{response, ResultCode};
use crate::protocol::{Command, Link, Pixy2, ProtocolError};

/// An RGB color sample; channels are always within 0-255
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    r: u8,
    g: u8,
    b: u8,
}

fn clamp_channel(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

impl Rgb {
    /// Build a color, clamping each channel into 0-255
    pub fn new(r: i32, g: i32, b: i32) -> Self {
        Self {
            r: clamp_channel(r),
            g: clamp_channel(g),
            b: clamp_channel(b),
        }
    }

    /// Unpack a 0xRRGGBB value
    pub fn from_packed(rgb: u32) -> Self {
        Self {
            r: (rgb >> 16) as u8,
            g: (rgb >> 8) as u8,
            b: rgb as u8,
        }
    }

    /// Pack as 0xRRGGBB
    pub fn packed(&self) -> u32 {
        (u32::from(self.r) << 16) | (u32::from(self.g) << 8) | u32::from(self.b)
    }

    pub fn r(&self) -> u8 {
        self.r
    }

    pub fn g(&self) -> u8 {
        self.g
    }

    pub fn b(&self) -> u8 {
        self.b
    }

    pub fn set_r(&mut self, r: i32) {
        self.r = clamp_channel(r);
    }

    pub fn set_g(&mut self, g: i32) {
        self.g = clamp_channel(g);
    }

    pub fn set_b(&mut self, b: i32) {
        self.b = clamp_channel(b);
    }

    pub fn set_rgb(&mut self, r: i32, g: i32, b: i32) {
        *self = Self::new(r, g, b);
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R: {} G: {} B: {}", self.r, self.g, self.b)
    }
}

impl<L: Link> Pixy2<L> {
    /// Sample the average color of the 5x5 area around `(x, y)`.
    ///
    /// With `saturate` set the sensor scales the sample so its largest
    /// channel reads 255. A program change in progress is waited out, up to
    /// the poll ceiling.
    pub fn get_rgb(&mut self, x: u16, y: u16, saturate: bool) -> Result<Rgb, ProtocolError> {
        let start = Instant::now();
        let mut request = [0u8; 5];
        request[0..2].copy_from_slice(&x.to_le_bytes());
        request[2..4].copy_from_slice(&y.to_le_bytes());
        request[4] = saturate as u8;

        loop {
            let len = self.stage(&request);
            self.exchange(Command::GetRgb, len)?;

            match self.response_type() {
                response::RESULT => {
                    let payload = self.response();
                    if payload.len() != 4 {
                        return Err(ProtocolError::InvalidLength {
                            expected: 4,
                            actual: payload.len(),
                        });
                    }
                    return Ok(Rgb::new(
                        i32::from(payload[0]),
                        i32::from(payload[1]),
                        i32::from(payload[2]),
                    ));
                }
                response::ERROR => {
                    let code = self.error_code();
                    if ResultCode::from_i8(code) != Some(ResultCode::ProgChanging) {
                        return Err(ProtocolError::from_sensor_code(code));
                    }
                    debug!("get_rgb: program changing, retrying");
                }
                other => {
                    return Err(ProtocolError::UnexpectedResponse {
                        expected: response::RESULT,
                        actual: other,
                    })
                }
            }

            self.poll_backoff(start)?;
        }
    }
}
