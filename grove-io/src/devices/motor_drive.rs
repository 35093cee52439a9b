//! I2C dual motor driver

use crate::bus::framer::CommandFramer;
use crate::error::Result;
use crate::port::{PortId, PortKind};
use crate::protocol::OutputProtocol;
use crate::unit::Unit;
use std::time::Duration;

const DRIVER_ADDRESS: u16 = 0x0F;
const CMD_SPEED: u8 = 0x82;
const CMD_DIRECTION: u8 = 0xAA;
const SETTLE: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorDirection {
    Forward,
    Backward,
}

/// Speed and/or direction of one motor; `None` leaves it unchanged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotorSetting {
    pub speed: Option<u8>,
    pub direction: Option<MotorDirection>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DualMotorSetting {
    pub motor_a: MotorSetting,
    pub motor_b: MotorSetting,
}

impl DualMotorSetting {
    /// Same speed on both motors
    pub fn speed(speed: u8) -> Self {
        let motor = MotorSetting {
            speed: Some(speed),
            direction: None,
        };
        Self {
            motor_a: motor,
            motor_b: motor,
        }
    }

    pub fn directions(a: MotorDirection, b: MotorDirection) -> Self {
        Self {
            motor_a: MotorSetting {
                speed: None,
                direction: Some(a),
            },
            motor_b: MotorSetting {
                speed: None,
                direction: Some(b),
            },
        }
    }
}

fn direction_bits(a: MotorDirection, b: MotorDirection) -> u8 {
    let a = match a {
        MotorDirection::Forward => 0x02,
        MotorDirection::Backward => 0x01,
    };
    let b = match b {
        MotorDirection::Forward => 0x08,
        MotorDirection::Backward => 0x04,
    };
    a | b
}

pub fn dual_motor_drive() -> (Unit, DualMotorDrive) {
    (
        Unit::output("I2C Motor Drive", &[PortKind::SerialBus]),
        DualMotorDrive,
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DualMotorDrive;

impl OutputProtocol for DualMotorDrive {
    type Value = DualMotorSetting;

    /// Speeds and directions are only sent when set for both motors
    fn write(&self, value: &DualMotorSetting, _port: PortId, framer: &CommandFramer) -> Result<()> {
        if let (Some(a), Some(b)) = (value.motor_a.speed, value.motor_b.speed) {
            framer.transaction(DRIVER_ADDRESS, |tx| {
                tx.write_frame(&[CMD_SPEED, a, b])?;
                tx.pause(SETTLE);
                Ok(())
            })?;
        }
        if let (Some(a), Some(b)) = (value.motor_a.direction, value.motor_b.direction) {
            framer.transaction(DRIVER_ADDRESS, |tx| {
                tx.write_frame(&[CMD_DIRECTION, direction_bits(a, b)])?;
                tx.pause(SETTLE);
                Ok(())
            })?;
        }
        Ok(())
    }
}
