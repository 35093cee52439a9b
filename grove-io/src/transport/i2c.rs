//! Linux I2C transport

use super::{BLOCK_LEN, FRAME_LEN, RetryPolicy, Transport};
use crate::error::{Error, Result};
use rppal::i2c::I2c;
use std::io;

/// SMBus command byte the board firmware expects on block transfers
const BLOCK_COMMAND: u8 = 1;

fn to_io(e: rppal::i2c::Error) -> io::Error {
    match e {
        rppal::i2c::Error::Io(e) => e,
        other => io::Error::other(other),
    }
}

/// I2C transport backed by `/dev/i2c-N`
pub struct I2cTransport {
    i2c: I2c,
    retry: RetryPolicy,
}

impl I2cTransport {
    /// Open an I2C bus
    ///
    /// # Arguments
    /// * `bus` - Bus number (1 on a Raspberry Pi)
    /// * `retry` - Retry policy applied to every primitive
    pub fn open(bus: u8, retry: RetryPolicy) -> Result<Self> {
        let i2c = I2c::with_bus(bus).map_err(|e| Error::TransportOpen(to_io(e)))?;
        log::info!("Opened I2C bus {} ({:?})", bus, retry);
        Ok(I2cTransport { i2c, retry })
    }
}

impl Transport for I2cTransport {
    fn set_target_address(&mut self, address: u16) -> Result<()> {
        let i2c = &mut self.i2c;
        self.retry
            .run("set_target_address", || i2c.set_slave_address(address).map_err(to_io))
    }

    fn write_frame(&mut self, frame: &[u8; FRAME_LEN]) -> Result<()> {
        let i2c = &self.i2c;
        self.retry
            .run("write_frame", || i2c.block_write(BLOCK_COMMAND, frame).map_err(to_io))
    }

    fn write_byte_data(&mut self, register: u8, value: u8) -> Result<()> {
        let i2c = &self.i2c;
        self.retry.run("write_byte_data", || {
            i2c.smbus_write_byte(register, value).map_err(to_io)
        })
    }

    fn read_byte(&mut self) -> Result<u8> {
        let i2c = &self.i2c;
        self.retry
            .run("read_byte", || i2c.smbus_receive_byte().map_err(to_io))
    }

    fn read_block(&mut self, buffer: &mut [u8; BLOCK_LEN]) -> Result<()> {
        let i2c = &self.i2c;
        self.retry.run("read_block", || {
            i2c.block_read(BLOCK_COMMAND, &mut buffer[..]).map_err(to_io)
        })
    }

    fn close(&mut self) -> Result<()> {
        // The file descriptor is released when the handle drops
        log::info!("Closing I2C bus");
        Ok(())
    }
}
