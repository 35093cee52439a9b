//! Grove sensor adapters
//!
//! Each constructor returns the unit declaration together with its read
//! protocol, ready for [`GroveBus::connect_input`](crate::GroveBus::connect_input).

use super::generic::{AnalogueRead, DigitalRead, be_u16, differs_by, expect_len};
use crate::bus::framer::ReadRequest;
use crate::error::Result;
use crate::port::PortKind;
use crate::protocol::InputProtocol;
use crate::unit::Unit;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const CMD_ULTRASONIC_READ: u8 = 7;
pub const CMD_DHT_READ: u8 = 40;

pub const BUTTON_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);
pub const LIGHT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
pub const SOUND_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
pub const POTENTIOMETER_SAMPLE_INTERVAL: Duration = Duration::from_millis(250);
pub const RANGER_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
pub const DHT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

// Firmware measurement takes ~50ms
const RANGER_READ_DELAY: Duration = Duration::from_millis(60);
const SOUND_READ_DELAY: Duration = Duration::from_millis(10);
const DHT_READ_DELAY: Duration = Duration::from_millis(10);

/// Momentary push button on a digital port
pub fn momentary_button(sample_interval: Duration) -> (Unit, DigitalRead) {
    let unit = Unit::input("Momentary On/Off Button", &[PortKind::Digital], sample_interval);
    (unit, DigitalRead)
}

/// Light sensor on an analogue port
pub fn light_sensor(sample_interval: Duration) -> (Unit, AnalogueRead) {
    let unit = Unit::input("Light Sensor", &[PortKind::Analogue], sample_interval);
    (unit, AnalogueRead::default())
}

/// Sound sensor on an analogue port
pub fn sound_sensor(sample_interval: Duration) -> (Unit, AnalogueRead) {
    let unit = Unit::input("Sound Sensor", &[PortKind::Analogue], sample_interval);
    (unit, AnalogueRead::with_delay(SOUND_READ_DELAY))
}

/// Rotary angle sensor on an analogue port
pub fn potentiometer(sample_interval: Duration) -> (Unit, AnalogueRead) {
    let unit = Unit::input("Potentiometer", &[PortKind::Analogue], sample_interval);
    (unit, AnalogueRead::default())
}

/// Ultrasonic distance sensor on a digital port
pub fn ultrasonic_ranger(sample_interval: Duration) -> (Unit, UltrasonicRead) {
    let unit = Unit::input("Ultrasonic Ranger", &[PortKind::Digital], sample_interval);
    (unit, UltrasonicRead)
}

/// DHT temperature and humidity sensor on a digital port
pub fn temperature_humidity(module: DhtModule, sample_interval: Duration) -> (Unit, DhtRead) {
    let name = format!("Temperature & Humidity Sensor ({})", module.name());
    let unit = Unit::input(name, &[PortKind::Digital], sample_interval);
    (unit, DhtRead { module })
}

/// Distance in centimeters
#[derive(Debug, Clone, Copy, Default)]
pub struct UltrasonicRead;

impl InputProtocol for UltrasonicRead {
    type Value = u16;

    fn read_request(&self) -> ReadRequest {
        ReadRequest::new(CMD_ULTRASONIC_READ, 2).with_delay(RANGER_READ_DELAY)
    }

    fn convert(&self, bytes: &[u8]) -> Result<u16> {
        be_u16(bytes)
    }

    fn is_significant(&self, new: &u16, previous: &u16) -> bool {
        differs_by(*new, *previous, 2)
    }
}

/// DHT module variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DhtModule {
    /// DHT11
    #[default]
    Blue,
    /// DHT22
    White,
}

impl DhtModule {
    fn id(self) -> u8 {
        match self {
            DhtModule::Blue => 0,
            DhtModule::White => 1,
        }
    }

    fn name(self) -> &'static str {
        match self {
            DhtModule::Blue => "blue",
            DhtModule::White => "white",
        }
    }
}

/// Temperature in °C and relative humidity in %
///
/// A field is NaN when the sensor returned an out-of-range reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureHumidity {
    pub temperature: f32,
    pub humidity: f32,
}

/// Resolution of the DHT sensors
const DHT_SIGNIFICANT_CHANGE: f32 = 1.0;

fn round_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy)]
pub struct DhtRead {
    module: DhtModule,
}

impl InputProtocol for DhtRead {
    type Value = TemperatureHumidity;

    fn read_request(&self) -> ReadRequest {
        ReadRequest::new(CMD_DHT_READ, 8)
            .with_parameters(&[self.module.id()])
            .with_delay(DHT_READ_DELAY)
    }

    fn convert(&self, bytes: &[u8]) -> Result<TemperatureHumidity> {
        expect_len(bytes, 8)?;
        let temperature = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let humidity = f32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

        let temperature = if temperature > -100.0 && temperature < 150.0 {
            round_tenth(temperature)
        } else {
            f32::NAN
        };
        let humidity = if (0.0..=100.0).contains(&humidity) {
            round_tenth(humidity)
        } else {
            f32::NAN
        };
        Ok(TemperatureHumidity {
            temperature,
            humidity,
        })
    }

    fn is_significant(&self, new: &TemperatureHumidity, previous: &TemperatureHumidity) -> bool {
        // A field dropping out or coming back counts as a change
        let changed = |new: f32, previous: f32| match (new.is_nan(), previous.is_nan()) {
            (true, true) => false,
            (true, false) | (false, true) => true,
            (false, false) => (new - previous).abs() >= DHT_SIGNIFICANT_CHANGE,
        };
        changed(new.temperature, previous.temperature) || changed(new.humidity, previous.humidity)
    }
}
