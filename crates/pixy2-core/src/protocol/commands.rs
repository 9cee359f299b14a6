//! Protocol commands
//!
//! Defines the request and response packet types understood by the sensor.

use serde::{Deserialize, Serialize};

/// Response packet types
pub mod response {
    /// Generic 4-byte result
    pub const RESULT: u8 = 0x01;
    /// Error response; first payload byte is a signed [`ResultCode`](super::ResultCode)
    pub const ERROR: u8 = 0x03;
    pub const RESOLUTION: u8 = 0x0D;
    pub const VERSION: u8 = 0x0F;
    pub const BLOCKS: u8 = 0x21;
    pub const LINE_FEATURES: u8 = 0x31;
}

/// Request commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Switch the running program (e.g. "color_connected_components")
    ChangeProgram,

    /// Query frame width and height
    GetResolution,

    /// Query hardware and firmware version
    GetVersion,

    /// Set camera brightness
    SetBrightness,

    /// Set pan/tilt servo positions
    SetServos,

    /// Set the RGB LED color
    SetLed,

    /// Switch the white lamps and RGB LED on or off
    SetLamp,

    /// Query current frame rate
    GetFps,

    /// Color connected components: get blocks
    GetBlocks,

    /// Line tracking: get features
    GetLineFeatures,

    /// Line tracking: set mode bits
    SetLineMode,

    /// Line tracking: select the tracked vector
    SetVector,

    /// Line tracking: angle for the next intersection
    SetNextTurn,

    /// Line tracking: default angle at intersections
    SetDefaultTurn,

    /// Line tracking: reverse the tracked vector
    ReverseVector,

    /// Video: sample a pixel color
    GetRgb,
}

impl Command {
    /// Packet type byte sent on the wire
    pub fn request_byte(&self) -> u8 {
        match self {
            Command::ChangeProgram => 0x02,
            Command::GetResolution => 0x0C,
            Command::GetVersion => 0x0E,
            Command::SetBrightness => 0x10,
            Command::SetServos => 0x12,
            Command::SetLed => 0x14,
            Command::SetLamp => 0x16,
            Command::GetFps => 0x18,
            Command::GetBlocks => 0x20,
            Command::GetLineFeatures => 0x30,
            Command::SetLineMode => 0x36,
            Command::SetVector => 0x38,
            Command::SetNextTurn => 0x3A,
            Command::SetDefaultTurn => 0x3C,
            Command::ReverseVector => 0x3E,
            Command::GetRgb => 0x70,
        }
    }

    /// Packet type of a successful response
    pub fn response_byte(&self) -> u8 {
        match self {
            Command::GetResolution => response::RESOLUTION,
            Command::GetVersion => response::VERSION,
            Command::GetBlocks => response::BLOCKS,
            Command::GetLineFeatures => response::LINE_FEATURES,
            _ => response::RESULT,
        }
    }

    /// Look up a command by its request byte
    pub fn from_request_byte(byte: u8) -> Option<Self> {
        const ALL: [Command; 16] = [
            Command::ChangeProgram,
            Command::GetResolution,
            Command::GetVersion,
            Command::SetBrightness,
            Command::SetServos,
            Command::SetLed,
            Command::SetLamp,
            Command::GetFps,
            Command::GetBlocks,
            Command::GetLineFeatures,
            Command::SetLineMode,
            Command::SetVector,
            Command::SetNextTurn,
            Command::SetDefaultTurn,
            Command::ReverseVector,
            Command::GetRgb,
        ];
        ALL.into_iter().find(|c| c.request_byte() == byte)
    }
}

/// Signed result codes used by the sensor in error responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultCode {
    Ok,
    Error,
    Busy,
    ChecksumError,
    Timeout,
    ButtonOverride,
    ProgChanging,
}

impl ResultCode {
    pub fn as_i8(&self) -> i8 {
        match self {
            ResultCode::Ok => 0,
            ResultCode::Error => -1,
            ResultCode::Busy => -2,
            ResultCode::ChecksumError => -3,
            ResultCode::Timeout => -4,
            ResultCode::ButtonOverride => -5,
            ResultCode::ProgChanging => -6,
        }
    }

    pub fn from_i8(code: i8) -> Option<Self> {
        match code {
            0 => Some(ResultCode::Ok),
            -1 => Some(ResultCode::Error),
            -2 => Some(ResultCode::Busy),
            -3 => Some(ResultCode::ChecksumError),
            -4 => Some(ResultCode::Timeout),
            -5 => Some(ResultCode::ButtonOverride),
            -6 => Some(ResultCode::ProgChanging),
            _ => None,
        }
    }
}
