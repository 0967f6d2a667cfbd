//! TCA9548A 8-port I²C multiplexer.
//!
//! The control register is a single byte: bit `n` connects downstream
//! port `n`. Writing `0x00` disconnects everything.

use embedded_hal::i2c::I2c;

use crate::bus::Multiplexer;
use crate::config::MUX_I2C_ADDRESS;
use crate::error::Error;

const PORTS: u8 = 8;

pub struct Tca9548a<I> {
    i2c: I,
    address: u8,
    /// Last mask written, `None` until the first successful write.
    mask: Option<u8>,
}

impl<I: I2c> Tca9548a<I> {
    pub fn new(i2c: I) -> Self {
        Self::with_address(i2c, MUX_I2C_ADDRESS)
    }

    pub fn with_address(i2c: I, address: u8) -> Self {
        Self {
            i2c,
            address,
            mask: None,
        }
    }

    /// Mask most recently written to the device.
    pub fn mask(&self) -> Option<u8> {
        self.mask
    }

    pub fn release(self) -> I {
        self.i2c
    }

    fn write_mask(&mut self, mask: u8) -> Result<(), Error> {
        self.i2c
            .write(self.address, &[mask])
            .map_err(|_| Error::Bus)?;
        self.mask = Some(mask);
        Ok(())
    }

    fn port_bit(port: u8) -> Result<u8, Error> {
        if port < PORTS {
            Ok(1 << port)
        } else {
            Err(Error::InvalidChannel(port))
        }
    }
}

impl<I: I2c> Multiplexer for Tca9548a<I> {
    fn close_all(&mut self) -> Result<(), Error> {
        self.write_mask(0x00)
    }

    /// Connect `port` exclusively.
    fn open_channel(&mut self, port: u8) -> Result<(), Error> {
        let bit = Self::port_bit(port)?;
        self.write_mask(bit)
    }

    fn close_channel(&mut self, port: u8) -> Result<(), Error> {
        let bit = Self::port_bit(port)?;
        self.write_mask(self.mask.unwrap_or(0) & !bit)
    }
}
