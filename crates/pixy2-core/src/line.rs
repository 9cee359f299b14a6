//! Line tracking
//!
//! A features response is a sequence of tagged sub-records:
//! - 1 byte: feature tag (vector, intersection or barcode)
//! - 1 byte: sub-record length
//! - N bytes: fixed-size records of that feature kind
//!
//! An unknown tag ends parsing; features decoded before it are kept.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::Instant;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::protocol::commands::{response, ResultCode};
use crate::protocol::{Command, Link, Pixy2, ProtocolError};

/// Line slots carried by every intersection record
pub const MAX_INTERSECTION_LINES: usize = 6;

pub const VECTOR_SIZE: usize = 6;
pub const INTERSECTION_LINE_SIZE: usize = 4;
pub const INTERSECTION_SIZE: usize = 4 + INTERSECTION_LINE_SIZE * MAX_INTERSECTION_LINES;
pub const BARCODE_SIZE: usize = 4;

/// Vector flag: the vector is not valid
pub const FLAG_INVALID: u8 = 0x02;
/// Vector flag: an intersection is in view
pub const FLAG_INTERSECTION_PRESENT: u8 = 0x04;

/// Mode bits for [`Pixy2::set_line_mode`]
pub mod mode {
    pub const TURN_DELAYED: u8 = 0x01;
    pub const MANUAL_SELECT_VECTOR: u8 = 0x02;
    pub const WHITE_LINE: u8 = 0x80;
}

/// Bitmap of line feature kinds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureSet(u8);

impl FeatureSet {
    pub const VECTOR: Self = Self(0x01);
    pub const INTERSECTION: Self = Self(0x02);
    pub const BARCODE: Self = Self(0x04);
    pub const ALL: Self = Self(0x07);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for FeatureSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for FeatureSet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

/// Which features the sensor should report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureSelector {
    /// Only the main (tracked) features
    Main,
    /// Everything detected in the frame
    All,
}

impl FeatureSelector {
    pub fn as_byte(&self) -> u8 {
        match self {
            FeatureSelector::Main => 0x00,
            FeatureSelector::All => 0x01,
        }
    }
}

/// A line segment, in the line-tracking grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vector {
    pub x0: u8,
    pub y0: u8,
    pub x1: u8,
    pub y1: u8,
    pub index: u8,
    pub flags: u8,
}

impl Vector {
    fn from_bytes(data: &[u8]) -> Self {
        Self {
            x0: data[0],
            y0: data[1],
            x1: data[2],
            y1: data[3],
            index: data[4],
            flags: data[5],
        }
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vector: ({} {}) ({} {}) index: {} flags: {}",
            self.x0, self.y0, self.x1, self.y1, self.index, self.flags
        )
    }
}

/// One branch leaving an intersection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntersectionLine {
    pub index: u8,
    pub reserved: u8,
    /// Branch angle in degrees (signed)
    pub angle: i16,
}

impl IntersectionLine {
    fn from_bytes(data: &[u8]) -> Self {
        Self {
            index: data[0],
            reserved: data[1],
            angle: LittleEndian::read_i16(&data[2..4]),
        }
    }
}

impl fmt::Display for IntersectionLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "intersection line: index: {} reserved: {} angle: {}",
            self.index, self.reserved, self.angle
        )
    }
}

/// A point where several lines meet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intersection {
    pub x: u8,
    pub y: u8,
    /// Number of valid entries in `lines`
    pub number: u8,
    pub reserved: u8,
    pub lines: [IntersectionLine; MAX_INTERSECTION_LINES],
}

impl Intersection {
    fn from_bytes(data: &[u8]) -> Self {
        let mut lines = [IntersectionLine::default(); MAX_INTERSECTION_LINES];
        for (line, chunk) in lines
            .iter_mut()
            .zip(data[4..INTERSECTION_SIZE].chunks_exact(INTERSECTION_LINE_SIZE))
        {
            *line = IntersectionLine::from_bytes(chunk);
        }
        Self {
            x: data[0],
            y: data[1],
            number: data[2],
            reserved: data[3],
            lines,
        }
    }

    /// The branches actually reported
    pub fn branches(&self) -> &[IntersectionLine] {
        let n = (self.number as usize).min(MAX_INTERSECTION_LINES);
        &self.lines[..n]
    }
}

impl fmt::Display for Intersection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "intersection: ({} {})", self.x, self.y)?;
        for (i, line) in self.lines.iter().enumerate() {
            write!(f, " line: {} index: {} angle: {}", i, line.index, line.angle)?;
        }
        Ok(())
    }
}

/// A barcode seen on the floor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Barcode {
    pub x: u8,
    pub y: u8,
    pub flags: u8,
    pub code: u16,
}

impl Barcode {
    fn from_bytes(data: &[u8]) -> Self {
        Self {
            x: data[0],
            y: data[1],
            flags: data[2],
            code: u16::from(data[3]),
        }
    }
}

impl fmt::Display for Barcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "barcode: ({} {}) value: {} flags: {}",
            self.x, self.y, self.code, self.flags
        )
    }
}

/// Features decoded from one response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFeatures {
    pub vectors: Vec<Vector>,
    pub intersections: Vec<Intersection>,
    pub barcodes: Vec<Barcode>,
}

impl LineFeatures {
    pub fn clear(&mut self) {
        self.vectors.clear();
        self.intersections.clear();
        self.barcodes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty() && self.intersections.is_empty() && self.barcodes.is_empty()
    }
}

/// Decode a features payload, returning the kinds present and their records
pub fn decode_features(payload: &[u8]) -> (FeatureSet, LineFeatures) {
    let mut found = FeatureSet::empty();
    let mut features = LineFeatures::default();
    let mut offset = 0;

    while offset + 2 <= payload.len() {
        let tag = payload[offset];
        let size = payload[offset + 1] as usize;
        let start = offset + 2;
        let data = &payload[start..(start + size).min(payload.len())];

        match FeatureSet::from_bits(tag) {
            FeatureSet::VECTOR => {
                features.vectors = data.chunks_exact(VECTOR_SIZE).map(Vector::from_bytes).collect();
                found |= FeatureSet::VECTOR;
            }
            FeatureSet::INTERSECTION => {
                features.intersections = data
                    .chunks_exact(INTERSECTION_SIZE)
                    .map(Intersection::from_bytes)
                    .collect();
                found |= FeatureSet::INTERSECTION;
            }
            FeatureSet::BARCODE => {
                features.barcodes = data
                    .chunks_exact(BARCODE_SIZE)
                    .map(Barcode::from_bytes)
                    .collect();
                found |= FeatureSet::BARCODE;
            }
            _ => {
                debug!("decode_features: unknown tag {:#04x} at offset {}", tag, offset);
                break;
            }
        }

        offset = start + size;
    }

    (found, features)
}

impl<L: Link> Pixy2<L> {
    /// Query line features.
    ///
    /// The caches are cleared before the request, so kinds missing from the
    /// response read as "none detected". Busy responses are polled when
    /// `wait` is set; any other sensor error is returned immediately.
    pub fn get_features(
        &mut self,
        selector: FeatureSelector,
        features: FeatureSet,
        wait: bool,
    ) -> Result<FeatureSet, ProtocolError> {
        self.line.clear();
        let start = Instant::now();

        loop {
            let len = self.stage(&[selector.as_byte(), features.bits()]);
            self.exchange(Command::GetLineFeatures, len)?;

            match self.response_type() {
                response::LINE_FEATURES => {
                    let (found, decoded) = decode_features(self.response());
                    self.line = decoded;
                    debug!(
                        "get_features: {} vectors, {} intersections, {} barcodes",
                        self.line.vectors.len(),
                        self.line.intersections.len(),
                        self.line.barcodes.len()
                    );
                    return Ok(found);
                }
                response::ERROR => {
                    let code = self.error_code();
                    if ResultCode::from_i8(code) != Some(ResultCode::Busy) {
                        return Err(ProtocolError::from_sensor_code(code));
                    }
                    if !wait {
                        return Err(ProtocolError::Busy);
                    }
                }
                other => debug!("get_features: ignoring response type {:#04x}", other),
            }

            self.poll_backoff(start)?;
        }
    }

    /// Main features of every kind, waiting for fresh data
    pub fn get_main_features(&mut self) -> Result<FeatureSet, ProtocolError> {
        self.get_features(FeatureSelector::Main, FeatureSet::ALL, true)
    }

    /// All features of every kind, waiting for fresh data
    pub fn get_all_features(&mut self) -> Result<FeatureSet, ProtocolError> {
        self.get_features(FeatureSelector::All, FeatureSet::ALL, true)
    }

    pub fn line_features(&self) -> &LineFeatures {
        &self.line
    }

    pub fn vectors(&self) -> &[Vector] {
        &self.line.vectors
    }

    pub fn intersections(&self) -> &[Intersection] {
        &self.line.intersections
    }

    pub fn barcodes(&self) -> &[Barcode] {
        &self.line.barcodes
    }

    /// Set line-tracking mode bits (see [`mode`])
    pub fn set_line_mode(&mut self, mode: u8) -> Result<i8, ProtocolError> {
        self.simple_result(Command::SetLineMode, &[mode])
    }

    /// Select the vector to track (manual-select mode)
    pub fn set_vector(&mut self, index: u8) -> Result<i8, ProtocolError> {
        self.simple_result(Command::SetVector, &[index])
    }

    /// Branch angle to take at the next intersection
    pub fn set_next_turn(&mut self, angle: i16) -> Result<i8, ProtocolError> {
        self.simple_result(Command::SetNextTurn, &angle.to_le_bytes())
    }

    /// Branch angle taken at intersections when no next turn is set
    pub fn set_default_turn(&mut self, angle: i16) -> Result<i8, ProtocolError> {
        self.simple_result(Command::SetDefaultTurn, &angle.to_le_bytes())
    }

    pub fn reverse_vector(&mut self) -> Result<i8, ProtocolError> {
        self.simple_result(Command::ReverseVector, &[])
    }
}
