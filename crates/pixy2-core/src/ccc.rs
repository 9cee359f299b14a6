//! Color Connected Components
//!
//! Block detection: each detected object (or color code) arrives as a
//! 14-byte record in a blocks response.

use std::fmt;
use std::time::Instant;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::protocol::commands::{response, ResultCode};
use crate::protocol::{Command, Link, Pixy2, ProtocolError};

/// Highest plain signature; anything above is a color code
pub const MAX_SIGNATURE: u16 = 7;

/// Size of one block record on the wire
pub const BLOCK_SIZE: usize = 14;

// Signature map bits; OR them together to select signatures
pub const SIG1: u8 = 0x01;
pub const SIG2: u8 = 0x02;
pub const SIG3: u8 = 0x04;
pub const SIG4: u8 = 0x08;
pub const SIG5: u8 = 0x10;
pub const SIG6: u8 = 0x20;
pub const SIG7: u8 = 0x40;
pub const COLOR_CODES: u8 = 0x80;
pub const SIG_ALL: u8 = 0xFF;

/// A detected block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Signature (1-7) or color code (octal digits packed above bit 2)
    pub signature: u16,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    /// Raw angle field; only meaningful for color codes
    pub angle: u16,
    /// Tracking index
    pub index: u8,
    /// Frames this block has been tracked
    pub age: u8,
}

impl Block {
    /// Decode one 14-byte record
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < BLOCK_SIZE {
            return None;
        }
        Some(Self {
            signature: LittleEndian::read_u16(&data[0..2]),
            x: LittleEndian::read_u16(&data[2..4]),
            y: LittleEndian::read_u16(&data[4..6]),
            width: LittleEndian::read_u16(&data[6..8]),
            height: LittleEndian::read_u16(&data[8..10]),
            angle: LittleEndian::read_u16(&data[10..12]),
            index: data[12],
            age: data[13],
        })
    }

    pub fn is_color_code(&self) -> bool {
        self.signature > MAX_SIGNATURE
    }

    /// Angle in degrees, reading the raw field as two's complement
    pub fn angle_degrees(&self) -> i16 {
        self.angle as i16
    }

    /// Color code signature as its octal digit string, e.g. `"12"` for 0o12
    pub fn color_code_digits(&self) -> String {
        format!("{:o}", self.signature)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_color_code() {
            write!(
                f,
                "CC block sig: {} ({} decimal) x: {} y: {} width: {} height: {} angle: {} index: {} age: {}",
                self.color_code_digits(),
                self.signature,
                self.x,
                self.y,
                self.width,
                self.height,
                self.angle_degrees(),
                self.index,
                self.age
            )
        } else {
            write!(
                f,
                "sig: {} x: {} y: {} width: {} height: {} index: {} age: {}",
                self.signature, self.x, self.y, self.width, self.height, self.index, self.age
            )
        }
    }
}

/// Decode a blocks payload; a trailing partial record is ignored
pub fn decode_blocks(payload: &[u8]) -> Vec<Block> {
    payload
        .chunks_exact(BLOCK_SIZE)
        .filter_map(Block::from_bytes)
        .collect()
}

impl<L: Link> Pixy2<L> {
    /// Query detected blocks.
    ///
    /// `sigmap` selects signatures (see [`SIG_ALL`]), `max_blocks` caps the
    /// count. While the sensor reports busy the query is repeated every poll
    /// interval if `wait` is set, otherwise [`ProtocolError::Busy`] is
    /// returned at once. A program change in progress is always reported
    /// immediately. The cache is replaced wholesale on success.
    pub fn get_blocks(
        &mut self,
        wait: bool,
        sigmap: u8,
        max_blocks: u8,
    ) -> Result<&[Block], ProtocolError> {
        let start = Instant::now();

        loop {
            let len = self.stage(&[sigmap, max_blocks]);
            self.exchange(Command::GetBlocks, len)?;

            match self.response_type() {
                response::BLOCKS => {
                    self.blocks = decode_blocks(self.response());
                    debug!("get_blocks: {} blocks", self.blocks.len());
                    return Ok(&self.blocks);
                }
                response::ERROR => match ResultCode::from_i8(self.error_code()) {
                    Some(ResultCode::Busy) if !wait => return Err(ProtocolError::Busy),
                    Some(ResultCode::ProgChanging) => return Err(ProtocolError::ProgramChanging),
                    _ => debug!("get_blocks: sensor error {}, polling", self.error_code()),
                },
                other => debug!("get_blocks: ignoring response type {:#04x}", other),
            }

            self.poll_backoff(start)?;
        }
    }

    /// Query all signatures, waiting for fresh data
    pub fn get_all_blocks(&mut self) -> Result<&[Block], ProtocolError> {
        self.get_blocks(true, SIG_ALL, 0xFF)
    }

    /// Blocks from the last successful query
    pub fn block_cache(&self) -> &[Block] {
        &self.blocks
    }
}
