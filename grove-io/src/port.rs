//! Port identities and labels of the GrovePi board
//!
//! A [`PortId`] is the normalized identity used by the registry: two ports
//! are the same port iff kind and numeric id match. A [`PortLabel`] is the
//! silk-screen name printed on the board and maps onto exactly one identity.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Electrical capability of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    Analogue,
    Digital,
    /// I2C bus connector
    SerialBus,
    Uart,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PortKind::Analogue => "analogue",
            PortKind::Digital => "digital",
            PortKind::SerialBus => "i2c",
            PortKind::Uart => "uart",
        };
        f.write_str(name)
    }
}

/// Normalized port identity (kind + numeric id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId {
    pub kind: PortKind,
    pub id: u8,
}

impl PortId {
    pub const fn new(kind: PortKind, id: u8) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Board connector labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortLabel {
    A0,
    A1,
    A2,
    D2,
    D3,
    D4,
    D5,
    D6,
    D7,
    D8,
    I2c1,
    I2c2,
    I2c3,
    /// Raspberry Pi serial header
    RpiSerial,
    /// Board UART connector
    Serial,
}

impl PortLabel {
    pub const ALL: [PortLabel; 15] = [
        PortLabel::A0,
        PortLabel::A1,
        PortLabel::A2,
        PortLabel::D2,
        PortLabel::D3,
        PortLabel::D4,
        PortLabel::D5,
        PortLabel::D6,
        PortLabel::D7,
        PortLabel::D8,
        PortLabel::I2c1,
        PortLabel::I2c2,
        PortLabel::I2c3,
        PortLabel::RpiSerial,
        PortLabel::Serial,
    ];

    pub fn kind(self) -> PortKind {
        match self {
            PortLabel::A0 | PortLabel::A1 | PortLabel::A2 => PortKind::Analogue,
            PortLabel::D2
            | PortLabel::D3
            | PortLabel::D4
            | PortLabel::D5
            | PortLabel::D6
            | PortLabel::D7
            | PortLabel::D8 => PortKind::Digital,
            PortLabel::I2c1 | PortLabel::I2c2 | PortLabel::I2c3 => PortKind::SerialBus,
            PortLabel::RpiSerial | PortLabel::Serial => PortKind::Uart,
        }
    }

    /// Numeric id used in command frames
    pub fn id(self) -> u8 {
        match self {
            PortLabel::A0 => 0,
            PortLabel::A1 | PortLabel::I2c1 | PortLabel::RpiSerial => 1,
            PortLabel::A2 | PortLabel::D2 | PortLabel::I2c2 | PortLabel::Serial => 2,
            PortLabel::D3 | PortLabel::I2c3 => 3,
            PortLabel::D4 => 4,
            PortLabel::D5 => 5,
            PortLabel::D6 => 6,
            PortLabel::D7 => 7,
            PortLabel::D8 => 8,
        }
    }

    pub fn port_id(self) -> PortId {
        PortId::new(self.kind(), self.id())
    }

    pub fn name(self) -> &'static str {
        match self {
            PortLabel::A0 => "A0",
            PortLabel::A1 => "A1",
            PortLabel::A2 => "A2",
            PortLabel::D2 => "D2",
            PortLabel::D3 => "D3",
            PortLabel::D4 => "D4",
            PortLabel::D5 => "D5",
            PortLabel::D6 => "D6",
            PortLabel::D7 => "D7",
            PortLabel::D8 => "D8",
            PortLabel::I2c1 => "I2C-1",
            PortLabel::I2c2 => "I2C-2",
            PortLabel::I2c3 => "I2C-3",
            PortLabel::RpiSerial => "RPISER",
            PortLabel::Serial => "SERIAL",
        }
    }
}

impl fmt::Display for PortLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PortLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        PortLabel::ALL
            .into_iter()
            .find(|label| label.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::InvalidParameter(format!("Unknown port label: {}", s)))
    }
}

impl Serialize for PortLabel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for PortLabel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_ignores_label_name() {
        // A2 and D2 share id 2 but differ in kind
        assert_ne!(PortLabel::A2.port_id(), PortLabel::D2.port_id());
        assert_eq!(PortLabel::D2.port_id(), PortId::new(PortKind::Digital, 2));
        assert_eq!(PortLabel::I2c1.port_id(), PortId::new(PortKind::SerialBus, 1));
        assert_eq!(PortLabel::Serial.port_id(), PortId::new(PortKind::Uart, 2));
    }

    #[test]
    fn test_label_ids() {
        let ids: Vec<u8> = [PortLabel::D2, PortLabel::D5, PortLabel::D8]
            .iter()
            .map(|l| l.id())
            .collect();
        assert_eq!(ids, vec![2, 5, 8]);
        assert_eq!(PortLabel::A0.id(), 0);
        assert_eq!(PortLabel::RpiSerial.id(), 1);
    }

    #[test]
    fn test_parse_labels() {
        for label in PortLabel::ALL {
            assert_eq!(label.name().parse::<PortLabel>().unwrap(), label);
        }
        assert_eq!("i2c-2".parse::<PortLabel>().unwrap(), PortLabel::I2c2);
        assert!("D9".parse::<PortLabel>().is_err());
    }
}
