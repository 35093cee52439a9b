//! RGB backlight LCD (16x2) on an I2C connector
//!
//! The display is two independent I2C peripherals: a backlight controller
//! and an HD44780-style text controller. Neither goes through the board
//! firmware, so writes run as custom bus transactions.

use crate::bus::framer::{BusTransaction, CommandFramer};
use crate::error::{Error, Result};
use crate::port::{PortId, PortKind};
use crate::protocol::OutputProtocol;
use crate::unit::Unit;
use std::time::Duration;

const RGB_ADDRESS: u16 = 0x62;
const TEXT_ADDRESS: u16 = 0x3E;

const TEXT_COMMAND: u8 = 0x80;
const TEXT_DATA: u8 = 0x40;
const CLEAR_DISPLAY: u8 = 0x01;
const RETURN_HOME: u8 = 0x02;
const DISPLAY_ON: u8 = 0x0C;
const TWO_LINES: u8 = 0x28;
const SECOND_ROW: u8 = 0xC0;

const COLUMNS: usize = 16;
const ROWS: usize = 2;
const SETTLE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}

/// What to show on the display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayText {
    pub color: Option<Rgb>,
    pub text: Option<String>,
    /// Overwrite in place instead of clearing first
    pub no_refresh: bool,
}

impl DisplayText {
    pub fn color(color: Rgb) -> Self {
        Self {
            color: Some(color),
            text: None,
            no_refresh: false,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            color: None,
            text: Some(text.into()),
            no_refresh: false,
        }
    }

    pub fn with_color(mut self, color: Rgb) -> Self {
        self.color = Some(color);
        self
    }

    pub fn without_refresh(mut self) -> Self {
        self.no_refresh = true;
        self
    }
}

pub fn rgb_lcd() -> (Unit, RgbLcd) {
    (Unit::output("RGB LCD Display", &[PortKind::SerialBus]), RgbLcd)
}

/// ISO-8859-1 encoding, one byte per char
fn latin1(text: &str) -> Result<Vec<u8>> {
    text.chars()
        .map(|c| {
            u8::try_from(u32::from(c)).map_err(|_| {
                Error::UnsupportedOutputValue(format!(
                    "{:?} contains characters outside ISO-8859-1",
                    text
                ))
            })
        })
        .collect()
}

/// Lay `bytes` out on the display: newline or a full row moves to the next
/// row, anything beyond the last row is dropped
fn layout(bytes: &[u8]) -> Vec<(u8, u8)> {
    let mut writes = Vec::new();
    let mut column = 0;
    let mut row = 0;
    for &byte in bytes {
        if byte == b'\n' || column == COLUMNS {
            if row == ROWS - 1 {
                break;
            }
            writes.push((TEXT_COMMAND, SECOND_ROW));
            row += 1;
            column = 0;
            if byte == b'\n' {
                continue;
            }
        }
        writes.push((TEXT_DATA, byte));
        column += 1;
    }
    writes
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RgbLcd;

impl RgbLcd {
    fn write_color(tx: &mut BusTransaction<'_>, color: Rgb) -> Result<()> {
        tx.write_byte_data(0x00, 0x00)?;
        tx.write_byte_data(0x01, 0x00)?;
        // All LEDs controlled by PWM
        tx.write_byte_data(0x08, 0xAA)?;
        tx.write_byte_data(0x04, color.red)?;
        tx.write_byte_data(0x03, color.green)?;
        tx.write_byte_data(0x02, color.blue)
    }

    fn write_text(tx: &mut BusTransaction<'_>, writes: &[(u8, u8)], no_refresh: bool) -> Result<()> {
        let reset = if no_refresh { RETURN_HOME } else { CLEAR_DISPLAY };
        tx.write_byte_data(TEXT_COMMAND, reset)?;
        tx.pause(SETTLE);
        tx.write_byte_data(TEXT_COMMAND, DISPLAY_ON)?;
        tx.write_byte_data(TEXT_COMMAND, TWO_LINES)?;
        tx.pause(SETTLE);
        for &(register, value) in writes {
            tx.write_byte_data(register, value)?;
        }
        Ok(())
    }
}

impl OutputProtocol for RgbLcd {
    type Value = DisplayText;

    fn write(&self, value: &DisplayText, _port: PortId, framer: &CommandFramer) -> Result<()> {
        // Encode before touching the bus so a bad string changes nothing
        let text = value
            .text
            .as_deref()
            .map(latin1)
            .transpose()?
            .map(|bytes| layout(&bytes));

        if let Some(color) = value.color {
            framer.transaction(RGB_ADDRESS, |tx| Self::write_color(tx, color))?;
        }
        if let Some(writes) = text {
            framer.transaction(TEXT_ADDRESS, |tx| Self::write_text(tx, &writes, value.no_refresh))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_encoding() {
        assert_eq!(latin1("Caf\u{e9}").unwrap(), vec![b'C', b'a', b'f', 0xE9]);
        assert!(matches!(
            latin1("\u{20ac}10"),
            Err(Error::UnsupportedOutputValue(_))
        ));
    }

    #[test]
    fn test_layout_wraps_and_truncates() {
        let writes = layout(b"0123456789abcdefXY");
        assert_eq!(writes.len(), 16 + 1 + 2);
        assert_eq!(writes[16], (TEXT_COMMAND, SECOND_ROW));
        assert_eq!(writes[17], (TEXT_DATA, b'X'));

        let writes = layout(b"hi\nthere\nlost");
        assert_eq!(writes.iter().filter(|w| w.0 == TEXT_COMMAND).count(), 1);
        assert_eq!(writes.len(), 2 + 1 + 5);
    }
}
