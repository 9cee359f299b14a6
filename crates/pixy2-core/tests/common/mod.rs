#![allow(dead_code)]

use pixy2_core::protocol::commands::response;
use pixy2_core::protocol::{
    Checksum, Link, Packet, ProtocolError, SessionConfig, SyncMode,
};
use std::collections::VecDeque;

/// Mock link: every `send` releases the next scripted response
pub struct ScriptedLink {
    /// Frames written by the host, one entry per send
    pub sent: Vec<Vec<u8>>,
    /// Responses released one per send
    script: VecDeque<Vec<u8>>,
    /// Released when the script is empty
    pub fallback: Option<Vec<u8>>,
    /// Bytes readable by the host
    rx: VecDeque<u8>,
    pub fail_open: bool,
    pub fail_send: bool,
    pub open_calls: u32,
    pub close_calls: u32,
    pub open_argument: Option<u32>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self {
            sent: Vec::new(),
            script: VecDeque::new(),
            fallback: None,
            rx: VecDeque::new(),
            fail_open: false,
            fail_send: false,
            open_calls: 0,
            close_calls: 0,
            open_argument: None,
        }
    }

    /// Queue raw bytes as the answer to the next unanswered request
    pub fn respond(mut self, bytes: Vec<u8>) -> Self {
        self.script.push_back(bytes);
        self
    }

    /// Queue `count` copies of the same answer
    pub fn respond_times(mut self, bytes: Vec<u8>, count: usize) -> Self {
        for _ in 0..count {
            self.script.push_back(bytes.clone());
        }
        self
    }

    pub fn otherwise(mut self, bytes: Vec<u8>) -> Self {
        self.fallback = Some(bytes);
        self
    }

    /// Request types sent so far
    pub fn sent_types(&self) -> Vec<u8> {
        self.sent.iter().map(|f| f[2]).collect()
    }

    /// Payload of the n-th request
    pub fn sent_payload(&self, n: usize) -> &[u8] {
        &self.sent[n][4..]
    }
}

impl Link for ScriptedLink {
    fn open(&mut self, argument: u32) -> Result<(), ProtocolError> {
        self.open_calls += 1;
        self.open_argument = Some(argument);
        if self.fail_open {
            return Err(ProtocolError::Transport(-1));
        }
        Ok(())
    }

    fn close(&mut self) {
        self.close_calls += 1;
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, ProtocolError> {
        if self.fail_send {
            return Err(ProtocolError::Transport(-3));
        }
        self.sent.push(data.to_vec());
        if let Some(bytes) = self.script.pop_front().or_else(|| self.fallback.clone()) {
            self.rx.extend(bytes);
        }
        Ok(data.len())
    }

    fn receive(
        &mut self,
        buf: &mut [u8],
        mut checksum: Option<&mut Checksum>,
    ) -> Result<usize, ProtocolError> {
        if let Some(cs) = checksum.as_deref_mut() {
            cs.reset();
        }
        if self.rx.len() < buf.len() {
            self.rx.clear();
            return Err(ProtocolError::Transport(-1));
        }
        for slot in buf.iter_mut() {
            *slot = self.rx.pop_front().unwrap();
            if let Some(cs) = checksum.as_deref_mut() {
                cs.update(*slot);
            }
        }
        Ok(buf.len())
    }
}

pub fn checksummed(packet_type: u8, payload: &[u8]) -> Vec<u8> {
    Packet::new(packet_type, payload.to_vec())
        .unwrap()
        .to_bytes(SyncMode::Checksummed)
}

pub fn plain(packet_type: u8, payload: &[u8]) -> Vec<u8> {
    Packet::new(packet_type, payload.to_vec())
        .unwrap()
        .to_bytes(SyncMode::Plain)
}

pub fn result(value: i32) -> Vec<u8> {
    checksummed(response::RESULT, &value.to_le_bytes())
}

pub fn error(code: i8) -> Vec<u8> {
    checksummed(response::ERROR, &[code as u8])
}

/// hardware 1, firmware 2.0.5 "video"
pub fn version_response() -> Vec<u8> {
    checksummed(
        response::VERSION,
        &[
            0x01, 0x00, 2, 0, 0x05, 0x00, b'v', b'i', b'd', b'e', b'o', 0, 0, 0, 0, 0,
        ],
    )
}

/// 288 x 224
pub fn resolution_response() -> Vec<u8> {
    checksummed(response::RESOLUTION, &[0x20, 0x01, 0xE0, 0x00])
}

/// Timing tightened so failing polls finish quickly
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        init_timeout_ms: 50,
        init_retry_interval_us: 1000,
        poll_timeout_ms: 20,
        ..SessionConfig::default()
    }
}
