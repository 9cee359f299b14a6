//! Running additive checksum
//!
//! The sensor's checksummed framing carries the sum of all payload bytes,
//! truncated to 16 bits.

/// Additive checksum accumulated one received byte at a time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checksum {
    sum: u16,
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one byte to the running sum
    pub fn update(&mut self, byte: u8) {
        self.sum = self.sum.wrapping_add(u16::from(byte));
    }

    /// Add every byte of `data`
    pub fn update_slice(&mut self, data: &[u8]) {
        for &b in data {
            self.update(b);
        }
    }

    pub fn value(&self) -> u16 {
        self.sum
    }

    pub fn reset(&mut self) {
        self.sum = 0;
    }

    /// Checksum of a complete payload
    pub fn of(data: &[u8]) -> u16 {
        let mut cs = Self::new();
        cs.update_slice(data);
        cs.value()
    }
}
