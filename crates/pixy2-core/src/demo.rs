//! Demo Mode - simulated sensor for running without hardware
//!
//! [`SimulatedPixy`] is a [`Link`] that parses each request written to it and
//! queues a well-formed response: blocks drifting across the frame, a line
//! vector sweeping left to right, occasional intersections and barcodes.
//! Seeded with a fixed value, it replays the same session every run.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::ccc::MAX_SIGNATURE;
use crate::line::FeatureSet;
use crate::protocol::commands::{response, ResultCode};
use crate::protocol::{
    Checksum, Command, Link, Packet, PacketBuilder, ProtocolError, SyncMode, MAX_PAYLOAD,
    NO_CHECKSUM_SYNC, SEND_HEADER_SIZE,
};

/// Line-tracking grid the simulated vectors live in
const LINE_GRID: (u8, u8) = (79, 52);

/// Knobs for the simulated sensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// RNG seed
    pub seed: u64,
    /// Frame size reported for every program
    pub width: u16,
    pub height: u16,
    /// Blocks generated per frame
    pub block_count: u8,
    /// Busy answers sent before each block or line frame
    pub busy_polls: u32,
    /// Program-changing answers sent after a program change
    pub program_change_polls: u32,
    /// Jitter line vectors and sprinkle intersections/barcodes at random
    pub line_noise: bool,
    /// Answer with checksummed framing (plain otherwise)
    pub checksummed: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            seed: 0x5049_5859,
            width: 316,
            height: 208,
            block_count: 3,
            busy_polls: 0,
            program_change_polls: 0,
            line_noise: false,
            checksummed: true,
        }
    }
}

/// Actuator settings last written by the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorState {
    pub brightness: u8,
    pub pan: u16,
    pub tilt: u16,
    pub led: [u8; 3],
    pub upper_lamp: bool,
    pub lower_lamp: bool,
    pub line_mode: u8,
    pub vector_index: u8,
    pub next_turn: i16,
    pub default_turn: i16,
    pub reversals: u32,
}

/// Simulated sensor
pub struct SimulatedPixy {
    config: DemoConfig,
    rng: StdRng,
    open: bool,
    /// Response bytes not yet read by the host
    rx: VecDeque<u8>,
    frame: u32,
    busy_left: u32,
    changing_left: u32,
    program: String,
    actuators: ActuatorState,
    requests: u64,
}

impl Default for SimulatedPixy {
    fn default() -> Self {
        Self::new(DemoConfig::default())
    }
}

impl SimulatedPixy {
    pub fn new(config: DemoConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            busy_left: config.busy_polls,
            config,
            rng,
            open: false,
            rx: VecDeque::new(),
            frame: 0,
            changing_left: 0,
            program: "color_connected_components".to_string(),
            actuators: ActuatorState::default(),
            requests: 0,
        }
    }

    pub fn config(&self) -> &DemoConfig {
        &self.config
    }

    /// Name of the running program
    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn actuators(&self) -> &ActuatorState {
        &self.actuators
    }

    /// Requests answered so far
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Frames generated so far
    pub fn frame(&self) -> u32 {
        self.frame
    }

    fn framing(&self) -> SyncMode {
        if self.config.checksummed {
            SyncMode::Checksummed
        } else {
            SyncMode::Plain
        }
    }

    fn queue(&mut self, packet: Packet) {
        trace!(
            "demo: queue type {:#04x}, {} bytes",
            packet.packet_type(),
            packet.len()
        );
        let bytes = packet.to_bytes(self.framing());
        self.rx.extend(bytes);
    }

    fn error_packet(code: ResultCode) -> Result<Packet, ProtocolError> {
        PacketBuilder::new(response::ERROR)
            .byte(code.as_i8() as u8)
            .build()
    }

    fn result_packet(value: i32) -> Result<Packet, ProtocolError> {
        PacketBuilder::new(response::RESULT).i32_le(value).build()
    }

    /// Answer one request
    fn respond(&mut self, packet_type: u8, payload: &[u8]) -> Result<Packet, ProtocolError> {
        let Some(command) = Command::from_request_byte(packet_type) else {
            debug!("demo: unknown request type {:#04x}", packet_type);
            return Self::error_packet(ResultCode::Error);
        };

        let arg = |i: usize| payload.get(i).copied().unwrap_or(0);
        let arg16 = |i: usize| u16::from_le_bytes([arg(i), arg(i + 1)]);

        let packet = match command {
            Command::GetVersion => PacketBuilder::new(response::VERSION)
                .u16_le(0x2201)
                .byte(3)
                .byte(0)
                .u16_le(18)
                .bytes(b"general\0\0\0")
                .build()?,
            Command::GetResolution => PacketBuilder::new(response::RESOLUTION)
                .u16_le(self.config.width)
                .u16_le(self.config.height)
                .build()?,
            Command::ChangeProgram => {
                let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
                self.program = String::from_utf8_lossy(&payload[..end]).into_owned();
                self.changing_left = self.config.program_change_polls;
                debug!("demo: program -> {:?}", self.program);
                Self::result_packet(1)?
            }
            Command::SetBrightness => {
                self.actuators.brightness = arg(0);
                Self::result_packet(0)?
            }
            Command::SetServos => {
                self.actuators.pan = arg16(0);
                self.actuators.tilt = arg16(2);
                Self::result_packet(0)?
            }
            Command::SetLed => {
                self.actuators.led = [arg(0), arg(1), arg(2)];
                Self::result_packet(0)?
            }
            Command::SetLamp => {
                self.actuators.upper_lamp = arg(0) != 0;
                self.actuators.lower_lamp = arg(1) != 0;
                Self::result_packet(0)?
            }
            Command::GetFps => Self::result_packet(60)?,
            Command::SetLineMode => {
                self.actuators.line_mode = arg(0);
                Self::result_packet(0)?
            }
            Command::SetVector => {
                self.actuators.vector_index = arg(0);
                Self::result_packet(0)?
            }
            Command::SetNextTurn => {
                self.actuators.next_turn = arg16(0) as i16;
                Self::result_packet(0)?
            }
            Command::SetDefaultTurn => {
                self.actuators.default_turn = arg16(0) as i16;
                Self::result_packet(0)?
            }
            Command::ReverseVector => {
                self.actuators.reversals += 1;
                Self::result_packet(0)?
            }
            Command::GetBlocks => match self.pending_status() {
                Some(code) => Self::error_packet(code)?,
                None => self.blocks_packet(arg(0), arg(1))?,
            },
            Command::GetLineFeatures => match self.pending_status() {
                Some(code) => Self::error_packet(code)?,
                None => self.features_packet(FeatureSet::from_bits(arg(1)))?,
            },
            Command::GetRgb => {
                if self.changing_left > 0 {
                    self.changing_left -= 1;
                    Self::error_packet(ResultCode::ProgChanging)?
                } else {
                    self.rgb_packet(arg16(0), arg16(2), arg(4) != 0)?
                }
            }
        };
        Ok(packet)
    }

    /// Program-changing or busy status owed before the next frame
    fn pending_status(&mut self) -> Option<ResultCode> {
        if self.changing_left > 0 {
            self.changing_left -= 1;
            return Some(ResultCode::ProgChanging);
        }
        if self.busy_left > 0 {
            self.busy_left -= 1;
            return Some(ResultCode::Busy);
        }
        self.busy_left = self.config.busy_polls;
        self.frame = self.frame.wrapping_add(1);
        None
    }

    fn blocks_packet(&mut self, sigmap: u8, max_blocks: u8) -> Result<Packet, ProtocolError> {
        let mut builder = PacketBuilder::new(response::BLOCKS);
        let width = u32::from(self.config.width.max(1));
        let height = self.config.height.max(1);
        let limit = usize::from(max_blocks).min(MAX_PAYLOAD / crate::ccc::BLOCK_SIZE);
        let mut emitted = 0;

        for i in 0..self.config.block_count {
            if emitted >= limit {
                break;
            }
            let signature = u16::from(i) % MAX_SIGNATURE + 1;
            if sigmap & (1 << (signature - 1)) == 0 {
                continue;
            }
            let x = ((self.frame * 3 + u32::from(i) * 40) % width) as u16;
            let y = height / 2 + self.rng.gen_range(0..8);
            let w = self.rng.gen_range(10..40);
            let h = self.rng.gen_range(10..40);
            builder = builder
                .u16_le(signature)
                .u16_le(x)
                .u16_le(y)
                .u16_le(w)
                .u16_le(h)
                .u16_le(0)
                .byte(i)
                .byte(self.frame.min(255) as u8);
            emitted += 1;
        }
        builder.build()
    }

    fn features_packet(&mut self, requested: FeatureSet) -> Result<Packet, ProtocolError> {
        let mut builder = PacketBuilder::new(response::LINE_FEATURES);
        let (grid_w, grid_h) = LINE_GRID;
        let top_x = (self.frame % u32::from(grid_w)) as u8;
        let jitter = |rng: &mut StdRng, noisy: bool| if noisy { rng.gen_range(0..3) } else { 0 };

        if requested.contains(FeatureSet::VECTOR) {
            let bottom_x = grid_w / 2 + jitter(&mut self.rng, self.config.line_noise);
            builder = builder
                .byte(FeatureSet::VECTOR.bits())
                .byte(6)
                .bytes(&[bottom_x, grid_h - 1, top_x, 0, 0, 0]);
        }

        let intersection_due =
            self.frame % 10 == 0 || (self.config.line_noise && self.rng.gen_bool(0.2));
        if requested.contains(FeatureSet::INTERSECTION) && intersection_due {
            builder = builder
                .byte(FeatureSet::INTERSECTION.bits())
                .byte(crate::line::INTERSECTION_SIZE as u8)
                .bytes(&[top_x, grid_h / 2, 3, 0]);
            for (slot, angle) in [-90i16, 0, 90, 0, 0, 0].into_iter().enumerate() {
                builder = builder.byte(slot as u8).byte(0).i16_le(angle);
            }
        }

        let barcode_due = self.frame % 5 == 0;
        if requested.contains(FeatureSet::BARCODE) && barcode_due {
            builder = builder
                .byte(FeatureSet::BARCODE.bits())
                .byte(4)
                .bytes(&[top_x, 10, 0, (self.frame % 16) as u8]);
        }

        builder.build()
    }

    fn rgb_packet(&mut self, x: u16, y: u16, saturate: bool) -> Result<Packet, ProtocolError> {
        let width = u32::from(self.config.width.max(1));
        let height = u32::from(self.config.height.max(1));
        let mut rgb = [
            (u32::from(x) * 255 / width).min(255),
            (u32::from(y) * 255 / height).min(255),
            128,
        ];
        if saturate {
            let max = rgb.iter().copied().max().unwrap_or(0).max(1);
            for channel in rgb.iter_mut() {
                *channel = *channel * 255 / max;
            }
        }
        PacketBuilder::new(response::RESULT)
            .bytes(&[rgb[0] as u8, rgb[1] as u8, rgb[2] as u8, 0])
            .build()
    }
}

impl Link for SimulatedPixy {
    fn open(&mut self, argument: u32) -> Result<(), ProtocolError> {
        debug!("demo: open (argument {:#x})", argument);
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        self.rx.clear();
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, ProtocolError> {
        if !self.open {
            return Err(ProtocolError::NotConnected);
        }
        if data.len() < SEND_HEADER_SIZE
            || u16::from_le_bytes([data[0], data[1]]) != NO_CHECKSUM_SYNC
            || data.len() != SEND_HEADER_SIZE + data[3] as usize
        {
            debug!("demo: malformed request ({} bytes)", data.len());
            self.queue(Self::error_packet(ResultCode::Error)?);
            return Ok(data.len());
        }

        self.requests += 1;
        let packet = self.respond(data[2], &data[SEND_HEADER_SIZE..])?;
        self.queue(packet);
        Ok(data.len())
    }

    fn receive(
        &mut self,
        buf: &mut [u8],
        mut checksum: Option<&mut Checksum>,
    ) -> Result<usize, ProtocolError> {
        if !self.open {
            return Err(ProtocolError::NotConnected);
        }
        if let Some(cs) = checksum.as_deref_mut() {
            cs.reset();
        }
        if self.rx.len() < buf.len() {
            self.rx.clear();
            return Err(ProtocolError::Transport(-1));
        }
        for slot in buf.iter_mut() {
            *slot = self.rx.pop_front().unwrap_or(0);
            if let Some(cs) = checksum.as_deref_mut() {
                cs.update(*slot);
            }
        }
        Ok(buf.len())
    }
}
