//! Protocol errors

use thiserror::Error;

use super::commands::ResultCode;

/// Errors that can occur while talking to the sensor
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Status reported by the link itself, carried through unchanged
    #[error("Transport error: status {0}")]
    Transport(i32),

    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("No sync marker found in response")]
    SyncTimeout,

    /// The sensor has no new data yet
    #[error("Sensor busy")]
    Busy,

    /// The sensor is switching programs
    #[error("Sensor program is changing")]
    ProgramChanging,

    /// Any other error code carried in an error response
    #[error("Sensor returned error code: {0}")]
    Sensor(i8),

    #[error("Unexpected response type: expected {expected:#04x}, got {actual:#04x}")]
    UnexpectedResponse { expected: u8, actual: u8 },

    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Operation timed out")]
    Timeout,

    #[error("Link is not open")]
    NotConnected,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProtocolError {
    /// Map an error-response code onto an error
    pub fn from_sensor_code(code: i8) -> Self {
        match ResultCode::from_i8(code) {
            Some(ResultCode::Busy) => ProtocolError::Busy,
            Some(ResultCode::ProgChanging) => ProtocolError::ProgramChanging,
            _ => ProtocolError::Sensor(code),
        }
    }

    /// Legacy numeric result code for this error
    pub fn code(&self) -> i8 {
        match self {
            ProtocolError::Busy => ResultCode::Busy.as_i8(),
            ProtocolError::ProgramChanging => ResultCode::ProgChanging.as_i8(),
            ProtocolError::ChecksumMismatch { .. } => ResultCode::ChecksumError.as_i8(),
            ProtocolError::Timeout => ResultCode::Timeout.as_i8(),
            ProtocolError::Sensor(code) => *code,
            _ => ResultCode::Error.as_i8(),
        }
    }

    /// Whether the caller may simply issue the same request again
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProtocolError::Busy | ProtocolError::ProgramChanging)
    }
}
