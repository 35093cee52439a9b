//! Device adapters for Grove modules
//!
//! Input devices:
//! - Momentary button, ultrasonic ranger, temperature & humidity (digital)
//! - Light, sound, potentiometer (analogue)
//!
//! Output devices:
//! - LED, buzzer (digital)
//! - RGB LCD, dual motor drive (I2C)

pub mod actuators;
pub mod generic;
pub mod lcd;
pub mod motor_drive;
pub mod sensors;

pub use generic::Level;
pub use sensors::{DhtModule, TemperatureHumidity};

use crate::bus::GroveBus;
use crate::connection::InputConnection;
use crate::error::Result;
use crate::port::PortLabel;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Input devices that can be named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Button,
    LightSensor,
    SoundSensor,
    Potentiometer,
    UltrasonicRanger,
    TemperatureHumidity(DhtModule),
}

impl DeviceKind {
    pub fn default_sample_interval(&self) -> Duration {
        match self {
            DeviceKind::Button => sensors::BUTTON_SAMPLE_INTERVAL,
            DeviceKind::LightSensor => sensors::LIGHT_SAMPLE_INTERVAL,
            DeviceKind::SoundSensor => sensors::SOUND_SAMPLE_INTERVAL,
            DeviceKind::Potentiometer => sensors::POTENTIOMETER_SAMPLE_INTERVAL,
            DeviceKind::UltrasonicRanger => sensors::RANGER_SAMPLE_INTERVAL,
            DeviceKind::TemperatureHumidity(_) => sensors::DHT_SAMPLE_INTERVAL,
        }
    }

    /// Connect the device on `label` and log every significant change
    pub fn watch(
        &self,
        bus: &GroveBus,
        label: PortLabel,
        sample_interval: Option<Duration>,
    ) -> Result<DeviceWatch> {
        let interval = sample_interval.unwrap_or_else(|| self.default_sample_interval());
        match *self {
            DeviceKind::Button => {
                let (unit, protocol) = sensors::momentary_button(interval);
                DeviceWatch::start(bus.connect_input(label, unit, protocol)?)
            }
            DeviceKind::LightSensor => {
                let (unit, protocol) = sensors::light_sensor(interval);
                DeviceWatch::start(bus.connect_input(label, unit, protocol)?)
            }
            DeviceKind::SoundSensor => {
                let (unit, protocol) = sensors::sound_sensor(interval);
                DeviceWatch::start(bus.connect_input(label, unit, protocol)?)
            }
            DeviceKind::Potentiometer => {
                let (unit, protocol) = sensors::potentiometer(interval);
                DeviceWatch::start(bus.connect_input(label, unit, protocol)?)
            }
            DeviceKind::UltrasonicRanger => {
                let (unit, protocol) = sensors::ultrasonic_ranger(interval);
                DeviceWatch::start(bus.connect_input(label, unit, protocol)?)
            }
            DeviceKind::TemperatureHumidity(module) => {
                let (unit, protocol) = sensors::temperature_humidity(module, interval);
                DeviceWatch::start(bus.connect_input(label, unit, protocol)?)
            }
        }
    }
}

/// Keeps a logging listener subscribed for as long as it lives
pub struct DeviceWatch {
    label: PortLabel,
    _listener: Arc<dyn Any + Send + Sync>,
}

impl DeviceWatch {
    fn start<V: Debug + Send + Sync + 'static>(connection: InputConnection<V>) -> Result<Self> {
        let label = connection.label();
        let name = connection.unit().name.clone();
        let listener = Arc::new(move |value: &V, _at: SystemTime| {
            log::info!("{} on {}: {:?}", name, label, value);
        });
        connection.add_listener(&listener)?;
        Ok(Self {
            label,
            _listener: listener,
        })
    }

    pub fn label(&self) -> PortLabel {
        self.label
    }
}
