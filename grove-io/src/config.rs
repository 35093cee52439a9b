//! Configuration for GroveIO
//!
//! Loads bus parameters and the daemon's port list from a TOML file.

use crate::devices::DeviceKind;
use crate::error::{Error, Result};
use crate::port::PortLabel;
use crate::transport::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Devices the daemon connects at startup
    #[serde(default)]
    pub ports: Vec<PortConfig>,
}

/// Bus and scheduler parameters
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BusConfig {
    /// Linux I2C bus number (`/dev/i2c-N`)
    pub bus_number: u8,
    /// 7-bit address of the board firmware
    pub device_address: u16,
    /// Retries after a failed transport primitive
    pub retry_count: u32,
    /// Pause between retries in microseconds
    pub retry_delay_us: u64,
    /// Floor for scan intervals in microseconds
    pub min_sample_interval_us: u64,
    /// Threads evaluating scan items
    pub evaluation_workers: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

/// One device connected by the daemon
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PortConfig {
    /// Board connector, e.g. `D4` or `A0`
    pub label: PortLabel,
    pub device: DeviceKind,
    /// Overrides the device's default sample interval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_interval_ms: Option<u64>,
}

impl BusConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, Duration::from_micros(self.retry_delay_us))
    }

    pub fn min_sample_interval(&self) -> Duration {
        Duration::from_micros(self.min_sample_interval_us)
    }

    /// Reject values the bus cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.device_address > 0x7F {
            return Err(Error::Config(format!(
                "device_address {:#x} is not a 7-bit address",
                self.device_address
            )));
        }
        if self.min_sample_interval_us == 0 {
            return Err(Error::Config(
                "min_sample_interval_us must be positive".to_string(),
            ));
        }
        if self.evaluation_workers == 0 {
            return Err(Error::Config(
                "evaluation_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bus_number: 1,
            device_address: 0x04,
            retry_count: 9,
            retry_delay_us: 1_000,
            min_sample_interval_us: 1_000,
            evaluation_workers: 4,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl PortConfig {
    pub fn sample_interval(&self) -> Option<Duration> {
        self.sample_interval_ms.map(Duration::from_millis)
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Arguments
    /// - `path`: Path to TOML configuration file
    ///
    /// # Example
    /// ```no_run
    /// use grove_io::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("grove.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.bus.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::DhtModule;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.bus.bus_number, 1);
        assert_eq!(config.bus.device_address, 0x04);
        assert_eq!(
            config.bus.retry_policy(),
            RetryPolicy::new(9, Duration::from_millis(1))
        );
        assert_eq!(config.bus.min_sample_interval(), Duration::from_millis(1));
        assert_eq!(config.logging.level, "info");
        assert!(config.ports.is_empty());
        config.bus.validate().unwrap();
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[bus]
bus_number = 0
min_sample_interval_us = 5000

[logging]
level = "debug"

[[ports]]
label = "D4"
device = "button"
sample_interval_ms = 100

[[ports]]
label = "D7"
device = { temperature_humidity = "white" }
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.bus.bus_number, 0);
        // Unset fields keep their defaults
        assert_eq!(config.bus.retry_count, 9);
        assert_eq!(config.bus.min_sample_interval(), Duration::from_millis(5));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.ports.len(), 2);
        assert_eq!(config.ports[0].label, PortLabel::D4);
        assert_eq!(config.ports[0].device, DeviceKind::Button);
        assert_eq!(config.ports[0].sample_interval(), Some(Duration::from_millis(100)));
        assert_eq!(
            config.ports[1].device,
            DeviceKind::TemperatureHumidity(DhtModule::White)
        );
        assert_eq!(config.ports[1].sample_interval(), None);
    }

    #[test]
    fn test_validation() {
        let bus = BusConfig {
            evaluation_workers: 0,
            ..Default::default()
        };
        assert!(matches!(bus.validate(), Err(Error::Config(_))));

        let bus = BusConfig {
            device_address: 0x100,
            ..Default::default()
        };
        assert!(bus.validate().is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grove.toml");
        let mut config = AppConfig::default();
        config.ports.push(PortConfig {
            label: PortLabel::A0,
            device: DeviceKind::LightSensor,
            sample_interval_ms: None,
        });

        config.to_file(&path).unwrap();
        let loaded = AppConfig::from_file(&path).unwrap();

        assert_eq!(loaded.bus, config.bus);
        assert_eq!(loaded.ports, config.ports);
    }
}
