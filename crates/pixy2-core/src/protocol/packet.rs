//! Packet encoding
//!
//! Wire format:
//! - 2 bytes: sync marker (little-endian), `0xC1AF` checksummed or `0xC1AE` plain
//! - 1 byte: packet type
//! - 1 byte: payload length
//! - 2 bytes: additive checksum of the payload (little-endian, checksummed framing only)
//! - N bytes: payload
//!
//! Requests are always sent with plain framing.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::{Checksum, ProtocolError, CHECKSUM_SYNC, MAX_PAYLOAD, NO_CHECKSUM_SYNC, SEND_HEADER_SIZE};

/// Framing mode, selected by the sync marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncMode {
    /// Header carries a 16-bit payload checksum
    Checksummed,
    /// Header is type and length only
    #[default]
    Plain,
}

impl SyncMode {
    /// Sync marker announcing this mode
    pub fn marker(&self) -> u16 {
        match self {
            SyncMode::Checksummed => CHECKSUM_SYNC,
            SyncMode::Plain => NO_CHECKSUM_SYNC,
        }
    }

    /// Mode announced by a sync marker, if it is one
    pub fn from_marker(marker: u16) -> Option<Self> {
        match marker {
            CHECKSUM_SYNC => Some(SyncMode::Checksummed),
            NO_CHECKSUM_SYNC => Some(SyncMode::Plain),
            _ => None,
        }
    }

    /// Header length following the sync marker
    pub fn header_len(&self) -> usize {
        match self {
            SyncMode::Checksummed => 4,
            SyncMode::Plain => 2,
        }
    }
}

/// A protocol packet; the payload never exceeds [`MAX_PAYLOAD`] bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    packet_type: u8,
    payload: Vec<u8>,
}

impl Packet {
    /// Create a packet, rejecting payloads that do not fit the length byte
    pub fn new(packet_type: u8, payload: Vec<u8>) -> Result<Self, ProtocolError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge(payload.len()));
        }
        Ok(Self {
            packet_type,
            payload,
        })
    }

    /// Packet type byte
    pub fn packet_type(&self) -> u8 {
        self.packet_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Additive checksum of the payload
    pub fn checksum(&self) -> u16 {
        Checksum::of(&self.payload)
    }

    /// Encode the packet to raw bytes in the given framing
    pub fn to_bytes(&self, mode: SyncMode) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_size(mode));

        let mut word = [0u8; 2];
        LittleEndian::write_u16(&mut word, mode.marker());
        bytes.extend_from_slice(&word);
        bytes.push(self.packet_type);
        bytes.push(self.payload.len() as u8);

        if mode == SyncMode::Checksummed {
            LittleEndian::write_u16(&mut word, self.checksum());
            bytes.extend_from_slice(&word);
        }

        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Get the total encoded size
    pub fn encoded_size(&self, mode: SyncMode) -> usize {
        2 + mode.header_len() + self.payload.len()
    }
}

/// Builder for constructing packets
pub struct PacketBuilder {
    packet_type: u8,
    payload: Vec<u8>,
}

impl PacketBuilder {
    /// Create a new packet builder
    pub fn new(packet_type: u8) -> Self {
        Self {
            packet_type,
            payload: Vec::new(),
        }
    }

    /// Add a single byte
    pub fn byte(mut self, b: u8) -> Self {
        self.payload.push(b);
        self
    }

    /// Add a 16-bit value (little-endian)
    pub fn u16_le(mut self, value: u16) -> Self {
        let mut bytes = [0u8; 2];
        LittleEndian::write_u16(&mut bytes, value);
        self.payload.extend_from_slice(&bytes);
        self
    }

    /// Add a signed 16-bit value (little-endian)
    pub fn i16_le(mut self, value: i16) -> Self {
        let mut bytes = [0u8; 2];
        LittleEndian::write_i16(&mut bytes, value);
        self.payload.extend_from_slice(&bytes);
        self
    }

    /// Add a 32-bit value (little-endian)
    pub fn u32_le(mut self, value: u32) -> Self {
        let mut bytes = [0u8; 4];
        LittleEndian::write_u32(&mut bytes, value);
        self.payload.extend_from_slice(&bytes);
        self
    }

    /// Add a signed 32-bit value (little-endian)
    pub fn i32_le(self, value: i32) -> Self {
        self.u32_le(value as u32)
    }

    /// Add raw bytes
    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.payload.extend_from_slice(data);
        self
    }

    /// Build the packet
    pub fn build(self) -> Result<Packet, ProtocolError> {
        Packet::new(self.packet_type, self.payload)
    }
}

/// Serialize a plain-framed request into `buf`, returning the frame length
pub(crate) fn encode_request(
    buf: &mut [u8],
    packet_type: u8,
    payload: &[u8],
) -> Result<usize, ProtocolError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(ProtocolError::PayloadTooLarge(payload.len()));
    }
    let total = SEND_HEADER_SIZE + payload.len();
    if buf.len() < total {
        return Err(ProtocolError::PayloadTooLarge(payload.len()));
    }

    LittleEndian::write_u16(&mut buf[0..2], NO_CHECKSUM_SYNC);
    buf[2] = packet_type;
    buf[3] = payload.len() as u8;
    buf[SEND_HEADER_SIZE..total].copy_from_slice(payload);
    Ok(total)
}
