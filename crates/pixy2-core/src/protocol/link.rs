//! Byte transport abstraction
//!
//! Any channel that can move raw bytes to and from the sensor (SPI, I2C,
//! UART) implements [`Link`]. The session engine owns exactly one link and
//! drives it synchronously.

use super::{Checksum, ProtocolError};

/// Raw byte channel to the sensor
pub trait Link {
    /// Establish the underlying channel.
    ///
    /// `argument` selects a hardware port or configuration;
    /// [`DEFAULT_LINK_ARGUMENT`](super::DEFAULT_LINK_ARGUMENT) means "use the default".
    fn open(&mut self, argument: u32) -> Result<(), ProtocolError>;

    /// Release the channel
    fn close(&mut self);

    /// Write all of `data`, returning the number of bytes sent
    fn send(&mut self, data: &[u8]) -> Result<usize, ProtocolError>;

    /// Block until `buf` is filled or the link gives up.
    ///
    /// When `checksum` is supplied it is reset first and then updated with
    /// every byte received.
    fn receive(
        &mut self,
        buf: &mut [u8],
        checksum: Option<&mut Checksum>,
    ) -> Result<usize, ProtocolError>;
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn open(&mut self, argument: u32) -> Result<(), ProtocolError> {
        (**self).open(argument)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, ProtocolError> {
        (**self).send(data)
    }

    fn receive(
        &mut self,
        buf: &mut [u8],
        checksum: Option<&mut Checksum>,
    ) -> Result<usize, ProtocolError> {
        (**self).receive(buf, checksum)
    }
}

impl<L: Link + ?Sized> Link for &mut L {
    fn open(&mut self, argument: u32) -> Result<(), ProtocolError> {
        (**self).open(argument)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, ProtocolError> {
        (**self).send(data)
    }

    fn receive(
        &mut self,
        buf: &mut [u8],
        checksum: Option<&mut Checksum>,
    ) -> Result<usize, ProtocolError> {
        (**self).receive(buf, checksum)
    }
}
