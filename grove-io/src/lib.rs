//! GroveIO - Host-side driver for GrovePi expansion boards
//!
//! This library multiplexes typed sensor and actuator connections onto the
//! single I2C bus of a GrovePi board and samples subscribed inputs in the
//! background, notifying listeners of significant changes.
//!
//! ## Features
//!
//! - `hardware` (default): Linux I2C transport via `rppal`

pub mod bus;
pub mod config;
pub mod connection;
pub mod devices;
pub mod error;
pub mod fanout;
pub mod port;
pub mod protocol;
pub mod scanner;
pub mod transport;
pub mod unit;

// Re-export commonly used types
pub use bus::GroveBus;
pub use config::{AppConfig, BusConfig};
pub use connection::{InputConnection, OutputConnection, PortConnection};
pub use error::{Error, Result};
pub use fanout::ValueListener;
pub use port::{PortId, PortKind, PortLabel};
pub use unit::{Direction, IoMode, Unit};
