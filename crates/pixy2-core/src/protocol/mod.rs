//! Sensor Protocol Communication
//!
//! Implements the Pixy2 packet protocol: sync detection, checksummed and
//! plain framing, and the request/response session built on top of it.

pub mod checksum;
pub mod commands;
mod connection;
mod error;
pub mod framing;
pub mod link;
mod packet;
pub mod serial;

pub use checksum::Checksum;
pub use commands::{Command, ResultCode};
pub use connection::{
    ConnectionState, Pixy2, SessionConfig, TrafficCounters, SERVO_CENTER_POS, SERVO_MAX_POS,
    SERVO_MIN_POS,
};
pub use error::ProtocolError;
pub use framing::{ResponseHeader, SyncPolicy};
pub use link::Link;
pub use packet::{Packet, PacketBuilder, SyncMode};
pub use serial::{list_ports, PortInfo, SerialConfig, UartLink, DEFAULT_BAUD_RATE};

/// Sync marker for checksummed framing
pub const CHECKSUM_SYNC: u16 = 0xC1AF;

/// Sync marker for plain framing
pub const NO_CHECKSUM_SYNC: u16 = 0xC1AE;

/// Receive/payload buffer size
pub const BUFFER_SIZE: usize = 0x104;

/// Request header: sync marker, type, length
pub const SEND_HEADER_SIZE: usize = 4;

/// Largest payload the length byte can describe
pub const MAX_PAYLOAD: usize = 255;

/// Program names are padded or truncated to this width
pub const MAX_PROGRAM_NAME: usize = 33;

/// Link argument meaning "default port"
pub const DEFAULT_LINK_ARGUMENT: u32 = 0x8000_0000;
