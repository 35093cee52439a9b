//! Transport layer for bus I/O abstraction

use crate::error::Result;

#[cfg(feature = "hardware")]
mod i2c;
mod mock;
mod retry;

#[cfg(feature = "hardware")]
pub use i2c::I2cTransport;
pub use mock::{MockTransport, TransportEvent};
pub use retry::RetryPolicy;

/// Size of a command frame written to the board
pub const FRAME_LEN: usize = 4;

/// Size of a block read response
pub const BLOCK_LEN: usize = 32;

/// Transport trait for the shared board bus
///
/// Implementations own their retry behaviour: by the time an error is
/// returned here, the transport has already given up on the operation.
pub trait Transport: Send {
    /// Address the peer for subsequent operations
    fn set_target_address(&mut self, address: u16) -> Result<()>;

    /// Write one fixed-size command frame
    fn write_frame(&mut self, frame: &[u8; FRAME_LEN]) -> Result<()>;

    /// Write a single register on the addressed peer
    fn write_byte_data(&mut self, register: u8, value: u8) -> Result<()>;

    /// Read a single byte from the addressed peer
    fn read_byte(&mut self) -> Result<u8>;

    /// Read one full response block from the addressed peer
    fn read_block(&mut self, buffer: &mut [u8; BLOCK_LEN]) -> Result<()>;

    /// Release the underlying bus handle
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
