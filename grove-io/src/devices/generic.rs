//! Plain board commands shared by most Grove modules

use crate::bus::framer::{CommandFramer, ReadRequest};
use crate::error::{Error, Result};
use crate::port::PortId;
use crate::protocol::{InputProtocol, OutputProtocol};
use std::time::Duration;

pub const CMD_DIGITAL_READ: u8 = 1;
pub const CMD_DIGITAL_WRITE: u8 = 2;
pub const CMD_ANALOGUE_READ: u8 = 3;
/// PWM duty cycle on digital pins
pub const CMD_ANALOGUE_WRITE: u8 = 4;

/// Largest value of the 10-bit ADC
pub const ANALOGUE_MAX: u16 = 1023;

/// Default change needed before an analogue sample is reported
pub const ANALOGUE_THRESHOLD: u16 = 2;

pub(crate) fn expect_len(bytes: &[u8], len: usize) -> Result<()> {
    if bytes.len() < len {
        return Err(Error::InvalidParameter(format!(
            "expected {} response bytes, got {}",
            len,
            bytes.len()
        )));
    }
    Ok(())
}

/// Big-endian reading of the first two bytes
pub(crate) fn be_u16(bytes: &[u8]) -> Result<u16> {
    expect_len(bytes, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn differs_by(new: u16, previous: u16, threshold: u16) -> bool {
    new.abs_diff(previous) >= threshold
}

/// Digital pin level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> Self {
        match level {
            Level::Low => 0,
            Level::High => 1,
        }
    }
}

/// Digital pin read, reporting every level change
#[derive(Debug, Clone, Copy, Default)]
pub struct DigitalRead;

impl InputProtocol for DigitalRead {
    type Value = Level;

    fn read_request(&self) -> ReadRequest {
        ReadRequest::new(CMD_DIGITAL_READ, 1)
    }

    fn convert(&self, bytes: &[u8]) -> Result<Level> {
        expect_len(bytes, 1)?;
        Ok(Level::from(bytes[0] != 0))
    }

    fn is_significant(&self, new: &Level, previous: &Level) -> bool {
        new != previous
    }
}

/// 10-bit analogue read
#[derive(Debug, Clone, Copy)]
pub struct AnalogueRead {
    /// Settle time between command and response
    pub delay: Duration,
    /// Minimum change that is reported
    pub threshold: u16,
}

impl AnalogueRead {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

impl Default for AnalogueRead {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            threshold: ANALOGUE_THRESHOLD,
        }
    }
}

impl InputProtocol for AnalogueRead {
    type Value = u16;

    fn read_request(&self) -> ReadRequest {
        ReadRequest::new(CMD_ANALOGUE_READ, 2).with_delay(self.delay)
    }

    fn convert(&self, bytes: &[u8]) -> Result<u16> {
        let raw = be_u16(bytes)?;
        if raw > ANALOGUE_MAX {
            return Err(Error::InvalidParameter(format!(
                "analogue sample {} exceeds {}",
                raw, ANALOGUE_MAX
            )));
        }
        Ok(raw)
    }

    fn is_significant(&self, new: &u16, previous: &u16) -> bool {
        differs_by(*new, *previous, self.threshold)
    }
}

/// Digital pin write
#[derive(Debug, Clone, Copy, Default)]
pub struct DigitalWrite;

impl OutputProtocol for DigitalWrite {
    type Value = Level;

    fn write(&self, value: &Level, port: PortId, framer: &CommandFramer) -> Result<()> {
        framer.write_command(CMD_DIGITAL_WRITE, port.id, &[u8::from(*value)])
    }
}

/// PWM write, 0..=255
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalogueWrite;

impl OutputProtocol for AnalogueWrite {
    type Value = u8;

    fn write(&self, value: &u8, port: PortId, framer: &CommandFramer) -> Result<()> {
        framer.write_command(CMD_ANALOGUE_WRITE, port.id, &[*value])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digital_conversion() {
        let protocol = DigitalRead;
        assert_eq!(protocol.convert(&[0]).unwrap(), Level::Low);
        assert_eq!(protocol.convert(&[1]).unwrap(), Level::High);
        assert!(protocol.convert(&[]).is_err());
        assert!(protocol.is_significant(&Level::High, &Level::Low));
        assert!(!protocol.is_significant(&Level::Low, &Level::Low));
    }

    #[test]
    fn test_analogue_conversion() {
        let protocol = AnalogueRead::default();
        assert_eq!(protocol.convert(&[0x03, 0xFF]).unwrap(), 1023);
        assert_eq!(protocol.convert(&[0x01, 0x00]).unwrap(), 256);
        assert!(protocol.convert(&[0x04, 0x00]).is_err());
    }

    #[test]
    fn test_analogue_threshold() {
        let protocol = AnalogueRead::default();
        assert!(!protocol.is_significant(&501, &500));
        assert!(protocol.is_significant(&502, &500));
        assert!(protocol.is_significant(&498, &500));
    }

    #[test]
    fn test_read_requests() {
        assert_eq!(DigitalRead.read_request().command, CMD_DIGITAL_READ);
        let request = AnalogueRead::with_delay(Duration::from_millis(10)).read_request();
        assert_eq!(request.response_len, 2);
        assert_eq!(request.timing.delay, Duration::from_millis(10));
    }
}
