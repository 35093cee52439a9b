//! Unit capability declarations
//!
//! A unit describes a sensor or actuator: its name, the port kinds it may be
//! plugged into and its direction. Equality is structural, which is how the
//! registry tells a repeated connect of the same sensor from a conflict.

use crate::port::PortKind;
use std::fmt;
use std::time::Duration;

/// Pin mode sent to the board when a connection is established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IoMode {
    Input = 0,
    Output = 1,
}

/// Data direction of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sampled peripheral with its requested scan interval
    Input { sample_interval: Duration },
    Output,
}

impl Direction {
    pub fn io_mode(&self) -> IoMode {
        match self {
            Direction::Input { .. } => IoMode::Input,
            Direction::Output => IoMode::Output,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub name: String,
    pub supported_kinds: Vec<PortKind>,
    pub direction: Direction,
}

impl Unit {
    /// Create an input unit
    ///
    /// # Arguments
    /// - `name`: Human readable unit name
    /// - `supported_kinds`: Port kinds the unit may occupy
    /// - `sample_interval`: Requested scan interval for change notifications
    pub fn input(
        name: impl Into<String>,
        supported_kinds: &[PortKind],
        sample_interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            supported_kinds: supported_kinds.to_vec(),
            direction: Direction::Input { sample_interval },
        }
    }

    /// Create an output unit
    pub fn output(name: impl Into<String>, supported_kinds: &[PortKind]) -> Self {
        Self {
            name: name.into(),
            supported_kinds: supported_kinds.to_vec(),
            direction: Direction::Output,
        }
    }

    pub fn supports(&self, kind: PortKind) -> bool {
        self.supported_kinds.contains(&kind)
    }

    /// Requested sample interval, `None` for outputs
    pub fn sample_interval(&self) -> Option<Duration> {
        match self.direction {
            Direction::Input { sample_interval } => Some(sample_interval),
            Direction::Output => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<String> = self.supported_kinds.iter().map(|k| k.to_string()).collect();
        write!(f, "{} [{}]", self.name, kinds.join(", "))?;
        if let Direction::Input { sample_interval } = self.direction {
            write!(f, " every {:?}", sample_interval)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality() {
        let a = Unit::input("Button", &[PortKind::Digital], Duration::from_millis(200));
        let b = Unit::input("Button", &[PortKind::Digital], Duration::from_millis(200));
        let slower = Unit::input("Button", &[PortKind::Digital], Duration::from_secs(1));
        assert_eq!(a, b);
        assert_ne!(a, slower);
        assert_ne!(a, Unit::output("Button", &[PortKind::Digital]));
    }

    #[test]
    fn test_io_mode_follows_direction() {
        let led = Unit::output("LED", &[PortKind::Digital]);
        assert_eq!(led.direction.io_mode(), IoMode::Output);
        assert_eq!(led.sample_interval(), None);
        assert!(led.supports(PortKind::Digital));
        assert!(!led.supports(PortKind::Analogue));
    }
}
