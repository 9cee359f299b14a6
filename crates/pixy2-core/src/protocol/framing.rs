//! Frame synchronization and response parsing
//!
//! Responses are located by scanning the byte stream for one of the two sync
//! markers. The sensor starts replying within about 100us of a request, so the
//! scan reads a few bytes, stalls briefly, and gives up after a bounded number
//! of stalls rather than spinning.

use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use tracing::{trace, warn};

use super::packet::encode_request;
use super::{Checksum, Link, Packet, ProtocolError, SyncMode, BUFFER_SIZE};

/// Bounds for the sync scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    /// Bytes read between stalls
    pub window: usize,
    /// Stalls allowed before giving up
    pub attempts: usize,
    /// Length of each stall
    pub stall: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            window: 4,
            attempts: 4,
            stall: Duration::from_micros(25),
        }
    }
}

/// Header of a received packet; the payload sits at the front of the receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub packet_type: u8,
    pub length: usize,
    pub mode: SyncMode,
}

/// Scan the link for a sync marker and report the framing it announces
pub fn acquire_sync<L: Link + ?Sized>(
    link: &mut L,
    policy: &SyncPolicy,
) -> Result<SyncMode, ProtocolError> {
    let mut prev: u8 = 0;
    let mut consumed = 0usize;
    let mut attempts = 0usize;
    let mut byte = [0u8; 1];

    loop {
        match link.receive(&mut byte, None) {
            Ok(_) => {
                // previous byte is the low half of the little-endian marker
                let word = u16::from(prev) | (u16::from(byte[0]) << 8);
                prev = byte[0];
                if let Some(mode) = SyncMode::from_marker(word) {
                    trace!("acquire_sync: found {:?} marker", mode);
                    return Ok(mode);
                }
            }
            Err(e) => trace!("acquire_sync: read failed while scanning: {}", e),
        }

        if consumed >= policy.window {
            if attempts >= policy.attempts {
                warn!("acquire_sync: no sync marker after {} stalls", attempts);
                return Err(ProtocolError::SyncTimeout);
            }
            std::thread::sleep(policy.stall);
            attempts += 1;
            consumed = 0;
        }
        consumed += 1;
    }
}

/// Read exactly `buf.len()` bytes, treating a short read as a framing error
fn receive_exact<L: Link + ?Sized>(
    link: &mut L,
    buf: &mut [u8],
    checksum: Option<&mut Checksum>,
) -> Result<(), ProtocolError> {
    let n = link.receive(buf, checksum)?;
    if n < buf.len() {
        return Err(ProtocolError::InvalidLength {
            expected: buf.len(),
            actual: n,
        });
    }
    Ok(())
}

/// Receive one response packet into `buf`.
///
/// `buf` must hold at least [`BUFFER_SIZE`] bytes. Link failures are returned
/// unchanged.
pub fn receive_packet<L: Link + ?Sized>(
    link: &mut L,
    buf: &mut [u8],
    policy: &SyncPolicy,
) -> Result<ResponseHeader, ProtocolError> {
    debug_assert!(buf.len() >= BUFFER_SIZE);

    let mode = acquire_sync(link, policy)?;
    let mut header = [0u8; 4];
    receive_exact(link, &mut header[..mode.header_len()], None)?;

    let packet_type = header[0];
    let length = header[1] as usize;

    match mode {
        SyncMode::Checksummed => {
            let expected = LittleEndian::read_u16(&header[2..4]);
            let mut checksum = Checksum::new();
            receive_exact(link, &mut buf[..length], Some(&mut checksum))?;
            if checksum.value() != expected {
                warn!(
                    "receive_packet: checksum mismatch on type {:#04x}: header {:#06x}, computed {:#06x}",
                    packet_type,
                    expected,
                    checksum.value()
                );
                return Err(ProtocolError::ChecksumMismatch {
                    expected,
                    actual: checksum.value(),
                });
            }
        }
        SyncMode::Plain => {
            receive_exact(link, &mut buf[..length], None)?;
        }
    }

    Ok(ResponseHeader {
        packet_type,
        length,
        mode,
    })
}

/// Receive one packet as an owned [`Packet`]
pub fn read_packet<L: Link + ?Sized>(
    link: &mut L,
    policy: &SyncPolicy,
) -> Result<(Packet, SyncMode), ProtocolError> {
    let mut buf = [0u8; BUFFER_SIZE];
    let header = receive_packet(link, &mut buf, policy)?;
    let packet = Packet::new(header.packet_type, buf[..header.length].to_vec())?;
    Ok((packet, header.mode))
}

/// Serialize a request into `buf` and hand it to the link
pub fn send_request<L: Link + ?Sized>(
    link: &mut L,
    buf: &mut [u8],
    packet_type: u8,
    payload: &[u8],
) -> Result<usize, ProtocolError> {
    let total = encode_request(buf, packet_type, payload)?;
    link.send(&buf[..total])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Link over a fixed byte sequence; fails once drained
    struct SliceLink {
        rx: VecDeque<u8>,
        tx: Vec<u8>,
    }

    impl SliceLink {
        fn new(bytes: &[u8]) -> Self {
            Self {
                rx: bytes.iter().copied().collect(),
                tx: Vec::new(),
            }
        }
    }

    impl Link for SliceLink {
        fn open(&mut self, _argument: u32) -> Result<(), ProtocolError> {
            Ok(())
        }

        fn close(&mut self) {}

        fn send(&mut self, data: &[u8]) -> Result<usize, ProtocolError> {
            self.tx.extend_from_slice(data);
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
            for slot in buf.iter_mut() {
                let b = self.rx.pop_front().ok_or(ProtocolError::Transport(-1))?;
                *slot = b;
                if let Some(cs) = checksum.as_deref_mut() {
                    cs.update(b);
                }
            }
            Ok(buf.len())
        }
    }

    fn policy() -> SyncPolicy {
        SyncPolicy {
            stall: Duration::from_micros(1),
            ..SyncPolicy::default()
        }
    }

    #[test]
    fn test_sync_detects_both_modes() {
        let mut link = SliceLink::new(&[0xAF, 0xC1]);
        assert_eq!(acquire_sync(&mut link, &policy()).unwrap(), SyncMode::Checksummed);

        let mut link = SliceLink::new(&[0xAE, 0xC1]);
        assert_eq!(acquire_sync(&mut link, &policy()).unwrap(), SyncMode::Plain);
    }

    #[test]
    fn test_sync_skips_leading_garbage() {
        let mut bytes = vec![0x00, 0x13, 0xC1, 0x55, 0xAF, 0x42, 0x00, 0x01, 0x02, 0x03];
        bytes.extend_from_slice(&[0xAE, 0xC1]);
        let mut link = SliceLink::new(&bytes);
        assert_eq!(acquire_sync(&mut link, &policy()).unwrap(), SyncMode::Plain);
        assert!(link.rx.is_empty());
    }

    #[test]
    fn test_sync_budget_exhausted() {
        let mut link = SliceLink::new(&[0x00; 64]);
        assert!(matches!(
            acquire_sync(&mut link, &policy()),
            Err(ProtocolError::SyncTimeout)
        ));
        // 5 bytes before the first stall, then 4 per stall
        assert_eq!(link.rx.len(), 64 - 21);
    }

    #[test]
    fn test_sync_on_dead_link() {
        let mut link = SliceLink::new(&[]);
        assert!(matches!(
            acquire_sync(&mut link, &policy()),
            Err(ProtocolError::SyncTimeout)
        ));
    }

    #[test]
    fn test_receive_checksummed_packet() {
        let packet = Packet::new(0x0D, vec![0x20, 0x01, 0xE0, 0x00]).unwrap();
        let mut link = SliceLink::new(&packet.to_bytes(SyncMode::Checksummed));
        let mut buf = [0u8; BUFFER_SIZE];

        let header = receive_packet(&mut link, &mut buf, &policy()).unwrap();
        assert_eq!(header.packet_type, 0x0D);
        assert_eq!(header.length, 4);
        assert_eq!(header.mode, SyncMode::Checksummed);
        assert_eq!(&buf[..4], &[0x20, 0x01, 0xE0, 0x00]);
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let packet = Packet::new(0x21, vec![1, 2, 3, 4, 5]).unwrap();
        let clean = packet.to_bytes(SyncMode::Checksummed);

        // payload follows sync, type, length and the header checksum
        for index in 6..clean.len() {
            let mut bytes = clean.clone();
            bytes[index] ^= 0x40;

            let mut link = SliceLink::new(&bytes);
            let mut buf = [0u8; BUFFER_SIZE];
            match receive_packet(&mut link, &mut buf, &policy()) {
                Err(ProtocolError::ChecksumMismatch { expected, actual }) => {
                    assert_eq!(expected, 15);
                    assert_ne!(actual, expected);
                }
                other => panic!("byte {}: expected checksum mismatch, got {:?}", index, other),
            }
        }
    }

    #[test]
    fn test_plain_packet_not_validated() {
        let packet = Packet::new(0x21, vec![1, 2, 3, 4, 5]).unwrap();
        let mut bytes = packet.to_bytes(SyncMode::Plain);
        let last = bytes.len() - 1;
        bytes[last] ^= 0x40;

        let mut link = SliceLink::new(&bytes);
        let (decoded, mode) = read_packet(&mut link, &policy()).unwrap();
        assert_eq!(mode, SyncMode::Plain);
        assert_eq!(decoded.payload(), &[1, 2, 3, 4, 0x45][..]);
    }

    #[test]
    fn test_truncated_payload_propagates_link_error() {
        let packet = Packet::new(0x21, vec![9; 14]).unwrap();
        let bytes = packet.to_bytes(SyncMode::Checksummed);
        let mut link = SliceLink::new(&bytes[..bytes.len() - 3]);
        let mut buf = [0u8; BUFFER_SIZE];
        assert!(matches!(
            receive_packet(&mut link, &mut buf, &policy()),
            Err(ProtocolError::Transport(-1))
        ));
    }

    #[test]
    fn test_send_request_uses_plain_framing() {
        let mut link = SliceLink::new(&[]);
        let mut buf = [0u8; BUFFER_SIZE + 4];
        let sent = send_request(&mut link, &mut buf, 0x30, &[0x01, 0x07]).unwrap();
        assert_eq!(sent, 6);
        assert_eq!(link.tx, vec![0xAE, 0xC1, 0x30, 0x02, 0x01, 0x07]);
    }

    #[test]
    fn test_roundtrip_all_lengths() {
        for mode in [SyncMode::Plain, SyncMode::Checksummed] {
            for len in [0usize, 1, 14, 128, 255] {
                let payload: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
                let packet = Packet::new(0x31, payload).unwrap();
                let mut link = SliceLink::new(&packet.to_bytes(mode));
                let (decoded, got_mode) = read_packet(&mut link, &policy()).unwrap();
                assert_eq!(decoded, packet);
                assert_eq!(got_mode, mode);
            }
        }
    }
}
