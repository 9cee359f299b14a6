//! Session management
//!
//! Owns the link and the shared send/receive buffers, and runs every
//! request/response exchange with the sensor. Feature queries (blocks, line
//! features, RGB samples) are implemented on [`Pixy2`] in their own modules.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use byteorder::{ByteOrder, LittleEndian};

use super::{
    commands::response, framing, Command, Link, ProtocolError, SyncMode, SyncPolicy, BUFFER_SIZE,
    DEFAULT_LINK_ARGUMENT, MAX_PROGRAM_NAME, SEND_HEADER_SIZE,
};
use crate::ccc::Block;
use crate::line::LineFeatures;
use crate::version::{Resolution, Version};

/// Lowest servo position
pub const SERVO_MIN_POS: i32 = 0;
/// Highest servo position
pub const SERVO_MAX_POS: i32 = 1000;
/// Servo center position
pub const SERVO_CENTER_POS: i32 = (SERVO_MAX_POS - SERVO_MIN_POS) / 2;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Link closed
    Disconnected,
    /// Link open, waiting for the sensor to answer
    Connecting,
    /// Sensor answered a version query
    Connected,
    /// Initialization failed
    Error,
}

/// Session timing configuration.
///
/// The defaults encode the sensor's documented response-time guarantees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Argument passed to [`Link::open`]
    pub link_argument: u32,
    /// How long `init` keeps retrying the version query
    pub init_timeout_ms: u64,
    /// Pause between version attempts during `init`
    pub init_retry_interval_us: u64,
    /// Wall-clock ceiling for block, line and RGB polling
    pub poll_timeout_ms: u64,
    /// Pause between polls while the sensor is busy
    pub poll_interval_us: u64,
    /// Pause between change-program attempts
    pub prog_change_interval_us: u64,
    /// Stall between sync scan windows
    pub sync_stall_us: u64,
    /// Bytes read per sync scan window
    pub sync_window_bytes: usize,
    /// Sync scan windows before giving up
    pub sync_attempts: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            link_argument: DEFAULT_LINK_ARGUMENT,
            init_timeout_ms: 5000,
            init_retry_interval_us: 5000,
            poll_timeout_ms: 500,
            poll_interval_us: 500,
            prog_change_interval_us: 1000,
            sync_stall_us: 25,
            sync_window_bytes: 4,
            sync_attempts: 4,
        }
    }
}

impl SessionConfig {
    /// Parse a JSON configuration; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json).map_err(|e| ProtocolError::Config(e.to_string()))
    }

    /// Load a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ProtocolError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProtocolError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&content)
    }

    pub fn sync_policy(&self) -> SyncPolicy {
        SyncPolicy {
            window: self.sync_window_bytes,
            attempts: self.sync_attempts,
            stall: Duration::from_micros(self.sync_stall_us),
        }
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn init_retry_interval(&self) -> Duration {
        Duration::from_micros(self.init_retry_interval_us)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }

    pub fn prog_change_interval(&self) -> Duration {
        Duration::from_micros(self.prog_change_interval_us)
    }
}

/// Cumulative link traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficCounters {
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub tx_packets: u64,
    pub rx_packets: u64,
}

/// Pixy2 session over a link.
///
/// Not reentrant: every call mutates the shared buffers in place, so callers
/// sharing a session across threads must serialize access themselves.
pub struct Pixy2<L: Link> {
    /// Byte transport
    link: L,
    /// Timing configuration
    config: SessionConfig,
    /// Sync scan bounds derived from `config`
    sync_policy: SyncPolicy,
    /// Current session state
    state: ConnectionState,
    /// Outbound frames and inbound payloads
    buffer: [u8; BUFFER_SIZE + SEND_HEADER_SIZE],
    /// Request payload staging
    payload: [u8; BUFFER_SIZE],
    /// Type of the last response
    response_type: u8,
    /// Payload length of the last response
    response_len: usize,
    /// Framing of the last response
    sync_mode: SyncMode,
    version: Option<Version>,
    resolution: Option<Resolution>,
    /// Blocks from the last successful query
    pub(crate) blocks: Vec<Block>,
    /// Line features from the last query
    pub(crate) line: LineFeatures,
    counters: TrafficCounters,
}

impl<L: Link> Pixy2<L> {
    /// Create a session with default timing (link not yet opened)
    pub fn new(link: L) -> Self {
        Self::with_config(link, SessionConfig::default())
    }

    /// Create a session with custom timing
    pub fn with_config(link: L, config: SessionConfig) -> Self {
        let sync_policy = config.sync_policy();
        Self {
            link,
            config,
            sync_policy,
            state: ConnectionState::Disconnected,
            buffer: [0; BUFFER_SIZE + SEND_HEADER_SIZE],
            payload: [0; BUFFER_SIZE],
            response_type: 0,
            response_len: 0,
            sync_mode: SyncMode::Plain,
            version: None,
            resolution: None,
            blocks: Vec::new(),
            line: LineFeatures::default(),
            counters: TrafficCounters::default(),
        }
    }

    /// Get current session state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Framing used by the most recent response
    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    /// Get cumulative tx/rx bytes and packet counters
    pub fn counters(&self) -> TrafficCounters {
        self.counters
    }

    /// Cached version, if one has been received
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Cached resolution, if one has been received
    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    pub fn frame_width(&self) -> Option<u16> {
        self.resolution.map(|r| r.width)
    }

    pub fn frame_height(&self) -> Option<u16> {
        self.resolution.map(|r| r.height)
    }

    /// Open the link and wait for the sensor to answer.
    ///
    /// Retries the version query until `init_timeout_ms` elapses; on the first
    /// answer the resolution is fetched as well.
    pub fn init(&mut self) -> Result<(), ProtocolError> {
        self.state = ConnectionState::Connecting;

        if let Err(e) = self.link.open(self.config.link_argument) {
            warn!("init: link open failed: {}", e);
            self.state = ConnectionState::Disconnected;
            return Err(e);
        }

        let timeout = self.config.init_timeout();
        let start = Instant::now();
        while start.elapsed() < timeout {
            let outcome = self.get_version().map(|_| ());
            match outcome {
                Ok(()) => {
                    if let Err(e) = self.get_resolution() {
                        warn!("init: resolution query failed: {}", e);
                    }
                    self.state = ConnectionState::Connected;
                    if let Some(version) = &self.version {
                        info!("init: sensor ready, {}", version);
                    }
                    return Ok(());
                }
                Err(e) => debug!("init: version query failed ({}), retrying", e),
            }
            std::thread::sleep(self.config.init_retry_interval());
        }

        warn!("init: no answer from sensor within {}ms", timeout.as_millis());
        self.state = ConnectionState::Error;
        Err(ProtocolError::Timeout)
    }

    /// Close the link
    pub fn close(&mut self) {
        if self.state != ConnectionState::Disconnected {
            self.link.close();
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Copy a request payload into the staging buffer, returning its length
    pub(crate) fn stage(&mut self, bytes: &[u8]) -> usize {
        let len = bytes.len().min(self.payload.len());
        self.payload[..len].copy_from_slice(&bytes[..len]);
        len
    }

    /// Send the staged payload as `command` and receive the response
    pub(crate) fn exchange(&mut self, command: Command, length: usize) -> Result<(), ProtocolError> {
        let packet_type = command.request_byte();
        debug!(
            "exchange: sending {:?} (type {:#04x}, {} bytes)",
            command, packet_type, length
        );

        let sent = framing::send_request(
            &mut self.link,
            &mut self.buffer,
            packet_type,
            &self.payload[..length],
        )?;
        self.counters.tx_bytes = self.counters.tx_bytes.saturating_add(sent as u64);
        self.counters.tx_packets = self.counters.tx_packets.saturating_add(1);

        let header = framing::receive_packet(&mut self.link, &mut self.buffer, &self.sync_policy)?;
        self.response_type = header.packet_type;
        self.response_len = header.length;
        self.sync_mode = header.mode;
        self.counters.rx_bytes = self
            .counters
            .rx_bytes
            .saturating_add((2 + header.mode.header_len() + header.length) as u64);
        self.counters.rx_packets = self.counters.rx_packets.saturating_add(1);

        debug!(
            "exchange: received type {:#04x}, {} bytes ({:?})",
            header.packet_type, header.length, header.mode
        );
        Ok(())
    }

    pub(crate) fn response_type(&self) -> u8 {
        self.response_type
    }

    /// Payload of the last response
    pub(crate) fn response(&self) -> &[u8] {
        &self.buffer[..self.response_len]
    }

    /// Signed code carried by an error response
    pub(crate) fn error_code(&self) -> i8 {
        self.response().first().map(|&b| b as i8).unwrap_or(-1)
    }

    /// Little-endian 32-bit result at the start of the last response
    fn result_word(&self) -> i32 {
        let payload = self.response();
        if payload.len() >= 4 {
            LittleEndian::read_i32(&payload[0..4])
        } else {
            0
        }
    }

    /// Stage, exchange and decode a command answered by a 4-byte result
    pub(crate) fn simple_result(&mut self, command: Command, payload: &[u8]) -> Result<i8, ProtocolError> {
        let len = self.stage(payload);
        self.exchange(command, len)?;

        let expected = command.response_byte();
        if self.response_type != expected {
            return Err(ProtocolError::UnexpectedResponse {
                expected,
                actual: self.response_type,
            });
        }
        if self.response_len != 4 {
            return Err(ProtocolError::InvalidLength {
                expected: 4,
                actual: self.response_len,
            });
        }
        Ok(self.result_word() as i8)
    }

    /// Sleep one poll interval, or fail once the poll ceiling has passed
    pub(crate) fn poll_backoff(&self, start: Instant) -> Result<(), ProtocolError> {
        if start.elapsed() > self.config.poll_timeout() {
            warn!(
                "poll: no data after {}ms, giving up",
                self.config.poll_timeout_ms
            );
            return Err(ProtocolError::Timeout);
        }
        std::thread::sleep(self.config.poll_interval());
        Ok(())
    }

    /// Query version info and cache it
    pub fn get_version(&mut self) -> Result<&Version, ProtocolError> {
        let command = Command::GetVersion;
        self.exchange(command, 0)?;
        match self.response_type {
            t if t == command.response_byte() => {
                let version = Version::from_payload(self.response())?;
                Ok(&*self.version.insert(version))
            }
            response::ERROR => Err(ProtocolError::Busy),
            other => Err(ProtocolError::UnexpectedResponse {
                expected: command.response_byte(),
                actual: other,
            }),
        }
    }

    /// Cached version, querying the sensor if none is cached yet
    pub fn version_info(&mut self) -> Result<&Version, ProtocolError> {
        if self.version.is_none() {
            self.get_version()?;
        }
        self.version.as_ref().ok_or(ProtocolError::NotConnected)
    }

    /// Query the frame resolution and cache it
    pub fn get_resolution(&mut self) -> Result<Resolution, ProtocolError> {
        // placeholder byte reserved for future query arguments
        let len = self.stage(&[0]);
        let expected = Command::GetResolution.response_byte();
        self.exchange(Command::GetResolution, len)?;
        if self.response_type != expected {
            return Err(ProtocolError::UnexpectedResponse {
                expected,
                actual: self.response_type,
            });
        }
        let resolution = Resolution::from_payload(self.response())?;
        self.resolution = Some(resolution);
        Ok(resolution)
    }

    /// Switch the sensor to another program.
    ///
    /// The name is truncated or NUL-padded to 33 bytes. Polls every
    /// `prog_change_interval_us` until the sensor reports success. There is
    /// no wall-clock ceiling: only a link or framing failure ends the loop
    /// early.
    pub fn change_program(&mut self, name: &str) -> Result<(), ProtocolError> {
        let mut staged = [0u8; MAX_PROGRAM_NAME];
        for (slot, b) in staged.iter_mut().zip(name.bytes()) {
            *slot = b;
        }

        loop {
            let len = self.stage(&staged);
            self.exchange(Command::ChangeProgram, len)?;

            let result = self.result_word();
            if result > 0 {
                info!("change_program: now running {:?}", name);
                if let Err(e) = self.get_resolution() {
                    warn!("change_program: resolution refresh failed: {}", e);
                }
                return Ok(());
            }

            debug!("change_program: result {}, retrying", result);
            std::thread::sleep(self.config.prog_change_interval());
        }
    }

    /// Set camera brightness (clamped to 0-255)
    pub fn set_camera_brightness(&mut self, brightness: i32) -> Result<i8, ProtocolError> {
        let brightness = brightness.clamp(0, 255) as u8;
        self.simple_result(Command::SetBrightness, &[brightness])
    }

    /// Set pan/tilt servo positions (clamped to 0-1000)
    pub fn set_servos(&mut self, pan: i32, tilt: i32) -> Result<i8, ProtocolError> {
        let pan = pan.clamp(SERVO_MIN_POS, SERVO_MAX_POS) as u16;
        let tilt = tilt.clamp(SERVO_MIN_POS, SERVO_MAX_POS) as u16;

        let mut payload = [0u8; 4];
        LittleEndian::write_u16(&mut payload[0..2], pan);
        LittleEndian::write_u16(&mut payload[2..4], tilt);
        self.simple_result(Command::SetServos, &payload)
    }

    /// Set the RGB LED (each channel clamped to 0-255)
    pub fn set_led(&mut self, r: i32, g: i32, b: i32) -> Result<i8, ProtocolError> {
        let payload = [
            r.clamp(0, 255) as u8,
            g.clamp(0, 255) as u8,
            b.clamp(0, 255) as u8,
        ];
        self.simple_result(Command::SetLed, &payload)
    }

    /// Set the RGB LED from a packed 0xRRGGBB value
    pub fn set_led_rgb(&mut self, rgb: u32) -> Result<i8, ProtocolError> {
        self.set_led(
            ((rgb >> 16) & 0xFF) as i32,
            ((rgb >> 8) & 0xFF) as i32,
            (rgb & 0xFF) as i32,
        )
    }

    /// Switch the white lamps (`upper`) and the RGB LED (`lower`) on or off
    pub fn set_lamp(&mut self, upper: bool, lower: bool) -> Result<i8, ProtocolError> {
        self.simple_result(Command::SetLamp, &[upper as u8, lower as u8])
    }

    /// Current frame rate in frames per second
    pub fn get_fps(&mut self) -> Result<u8, ProtocolError> {
        self.simple_result(Command::GetFps, &[]).map(|fps| fps as u8)
    }
}

impl<L: Link> Drop for Pixy2<L> {
    fn drop(&mut self) {
        self.close();
    }
}
