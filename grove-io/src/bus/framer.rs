//! Command framing for the board firmware
//!
//! Every logical command is one transaction on the shared bus:
//!
//! ```text
//!   lock ─► settle gap ─► select address ─► write frame ─► delay ─► read status ─► [read block]
//! ```
//!
//! The lock is held for the whole transaction so frames of concurrent callers
//! never interleave. A single "next allowed transaction" cursor is carried
//! between transactions so a device gets its settle time even when the next
//! command comes from a different caller.

use crate::error::{Error, Result};
use crate::transport::{BLOCK_LEN, FRAME_LEN, Transport};
use crate::unit::IoMode;
use parking_lot::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Set pin mode
pub const CMD_SET_IO_MODE: u8 = 5;
/// Read firmware version
pub const CMD_FIRMWARE_VERSION: u8 = 8;

const FIRMWARE_READ_DELAY: Duration = Duration::from_millis(100);

/// Device settle times around a read command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandTiming {
    /// Minimum quiet time before the frame is sent
    pub gap_before: Duration,
    /// Wait between the frame and the response read
    pub delay: Duration,
    /// Quiet time the device needs after the response
    pub gap_after: Duration,
}

/// A framed read command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub command: u8,
    pub parameters: [u8; 2],
    pub timing: CommandTiming,
    /// Number of value bytes expected back
    pub response_len: usize,
}

impl ReadRequest {
    pub fn new(command: u8, response_len: usize) -> Self {
        Self {
            command,
            parameters: [0; 2],
            timing: CommandTiming::default(),
            response_len,
        }
    }

    pub fn with_parameters(mut self, parameters: &[u8]) -> Self {
        self.parameters = pad(parameters);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.timing.delay = delay;
        self
    }

    pub fn with_timing(mut self, timing: CommandTiming) -> Self {
        self.timing = timing;
        self
    }
}

fn pad<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    for (slot, byte) in out.iter_mut().zip(bytes) {
        *slot = *byte;
    }
    out
}

struct FramerState {
    transport: Box<dyn Transport>,
    next_allowed: Option<Instant>,
    closed: bool,
}

impl FramerState {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::DisconnectedBus);
        }
        Ok(())
    }

    /// Sleep for the larger of `gap_before` and the remaining cursor time
    fn settle(&self, gap_before: Duration) {
        let remaining = self
            .next_allowed
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or_default();
        let wait = gap_before.max(remaining);
        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }
}

/// Serializes command transactions onto the board
pub struct CommandFramer {
    state: Mutex<FramerState>,
    board_address: u16,
}

impl CommandFramer {
    pub fn new(transport: Box<dyn Transport>, board_address: u16) -> Self {
        Self {
            state: Mutex::new(FramerState {
                transport,
                next_allowed: None,
                closed: false,
            }),
            board_address,
        }
    }

    /// Send a read command for `port` and return the value bytes
    pub fn read_command(&self, port: u8, request: &ReadRequest) -> Result<Vec<u8>> {
        let len = request.response_len;
        if len == 0 || len >= BLOCK_LEN {
            return Err(Error::InvalidParameter(format!(
                "response length {} outside 1..{}",
                len, BLOCK_LEN
            )));
        }
        let frame = [
            request.command,
            port,
            request.parameters[0],
            request.parameters[1],
        ];

        let mut state = self.state.lock();
        state.ensure_open()?;
        state.settle(request.timing.gap_before);

        let transport = state.transport.as_mut();
        transport.set_target_address(self.board_address)?;
        transport.write_frame(&frame)?;
        log::trace!("frame {:02x?}", frame);
        if !request.timing.delay.is_zero() {
            thread::sleep(request.timing.delay);
        }

        // The status byte doubles as the value for single byte reads
        let status = transport.read_byte()?;
        let bytes = if len == 1 {
            vec![status]
        } else {
            let mut block = [0u8; BLOCK_LEN];
            transport.read_block(&mut block)?;
            block[1..=len].to_vec()
        };
        log::trace!("response {:02x?}", bytes);

        state.next_allowed = Some(Instant::now() + request.timing.gap_after);
        Ok(bytes)
    }

    /// Send a write command with up to two value bytes, zero padded
    pub fn write_command(&self, command: u8, port: u8, values: &[u8]) -> Result<()> {
        if values.len() > FRAME_LEN - 2 {
            return Err(Error::InvalidParameter(format!(
                "{} value bytes do not fit a frame",
                values.len()
            )));
        }
        let tail: [u8; 2] = pad(values);
        let frame = [command, port, tail[0], tail[1]];

        let mut state = self.state.lock();
        state.ensure_open()?;
        state.settle(Duration::ZERO);
        let transport = state.transport.as_mut();
        transport.set_target_address(self.board_address)?;
        transport.write_frame(&frame)?;
        log::trace!("frame {:02x?}", frame);
        Ok(())
    }

    pub fn set_io_mode(&self, port: u8, mode: IoMode) -> Result<()> {
        self.write_command(CMD_SET_IO_MODE, port, &[mode as u8])
    }

    /// Run a custom transaction against another peer on the bus
    ///
    /// Used by modules that are not driven through the board firmware, such
    /// as I2C displays. The bus lock is held until `f` returns.
    pub fn transaction<T, F>(&self, address: u16, f: F) -> Result<T>
    where
        F: FnOnce(&mut BusTransaction<'_>) -> Result<T>,
    {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.settle(Duration::ZERO);
        let transport = state.transport.as_mut();
        transport.set_target_address(address)?;
        let mut tx = BusTransaction { transport };
        f(&mut tx)
    }

    /// Read the firmware version as `major.minor.patch`
    pub fn firmware_version(&self) -> Result<String> {
        let request = ReadRequest::new(CMD_FIRMWARE_VERSION, 3).with_delay(FIRMWARE_READ_DELAY);
        let bytes = self.read_command(0, &request)?;
        Ok(format!("{}.{}.{}", bytes[0], bytes[1], bytes[2]))
    }

    /// Close the transport; later commands fail with `DisconnectedBus`
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.transport.close()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Handle to the bus inside [`CommandFramer::transaction`]
pub struct BusTransaction<'a> {
    transport: &'a mut dyn Transport,
}

impl BusTransaction<'_> {
    /// Write a frame of up to four bytes, zero padded
    pub fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > FRAME_LEN {
            return Err(Error::InvalidParameter(format!(
                "{} bytes do not fit a frame",
                bytes.len()
            )));
        }
        let frame: [u8; FRAME_LEN] = pad(bytes);
        log::trace!("custom frame {:02x?}", frame);
        self.transport.write_frame(&frame)
    }

    pub fn write_byte_data(&mut self, register: u8, value: u8) -> Result<()> {
        self.transport.write_byte_data(register, value)
    }

    /// Hold the bus while the peer settles
    pub fn pause(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}
