//! Board-driven output modules

use super::generic::{AnalogueWrite, DigitalWrite};
use crate::port::PortKind;
use crate::unit::Unit;

/// LED with PWM brightness (use a PWM capable pin: D3, D5 or D6)
pub fn led() -> (Unit, AnalogueWrite) {
    (Unit::output("LED", &[PortKind::Digital]), AnalogueWrite)
}

/// On/off buzzer
pub fn buzzer() -> (Unit, DigitalWrite) {
    (Unit::output("Buzzer", &[PortKind::Digital]), DigitalWrite)
}
