//! GrovePi bus handle
//!
//! [`GroveBus`] is the entry point: it owns the command framer, the port
//! registry and the change scanner. Each of the three is guarded by its own
//! lock, so registry and scanner bookkeeping never waits on bus I/O.
//!
//! The handle is cheap to clone. Connections refer back to the bus weakly and
//! report [`Error::DisconnectedBus`](crate::Error::DisconnectedBus) once it has
//! been closed or dropped.

pub mod framer;
pub mod registry;

use crate::config::BusConfig;
use crate::connection::{InputConnection, InputPort, OutputConnection, OutputPort, PortConnection};
use crate::error::{Error, Result};
use crate::port::{PortId, PortLabel};
use crate::protocol::{InputProtocol, OutputProtocol};
use crate::scanner::ChangeScanner;
use crate::transport::Transport;
use crate::unit::{Direction, Unit};
use framer::CommandFramer;
use registry::PortRegistry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) struct BusShared {
    pub(crate) framer: CommandFramer,
    pub(crate) registry: PortRegistry,
    pub(crate) scanner: ChangeScanner,
    closed: AtomicBool,
}

impl BusShared {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let drained = self.registry.drain();
        self.scanner.shutdown();
        log::info!("Bus closed ({} ports released)", drained);
        self.framer.close()
    }
}

impl Drop for BusShared {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Error closing bus: {}", e);
        }
    }
}

/// Handle to the GrovePi board
#[derive(Clone)]
pub struct GroveBus {
    shared: Arc<BusShared>,
}

impl GroveBus {
    /// Open the board on the Linux I2C bus named in `config`
    #[cfg(feature = "hardware")]
    pub fn open(config: &BusConfig) -> Result<Self> {
        let transport = crate::transport::I2cTransport::open(config.bus_number, config.retry_policy())?;
        Self::with_transport(Box::new(transport), config)
    }

    /// Build a bus over any transport
    ///
    /// # Arguments
    /// * `transport` - Bus primitives, already opened
    /// * `config` - Board address, scan floor and worker count
    pub fn with_transport(transport: Box<dyn Transport>, config: &BusConfig) -> Result<Self> {
        config.validate()?;
        let scanner = ChangeScanner::new(config.min_sample_interval(), config.evaluation_workers)?;
        log::info!(
            "GrovePi bus ready at {:#04x} (scan floor {:?})",
            config.device_address,
            config.min_sample_interval()
        );
        Ok(Self {
            shared: Arc::new(BusShared {
                framer: CommandFramer::new(transport, config.device_address),
                registry: PortRegistry::new(),
                scanner,
                closed: AtomicBool::new(false),
            }),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shared.is_closed() {
            return Err(Error::DisconnectedBus);
        }
        Ok(())
    }

    /// Connect an input unit to `label`
    ///
    /// Connecting a structurally equal unit with the same adapter type to a
    /// port it already occupies returns the existing connection.
    pub fn connect_input<P: InputProtocol>(
        &self,
        label: PortLabel,
        unit: Unit,
        protocol: P,
    ) -> Result<InputConnection<P::Value>> {
        self.ensure_open()?;
        if !matches!(unit.direction, Direction::Input { .. }) {
            return Err(Error::InvalidParameter(format!("{} is not an input unit", unit.name)));
        }
        let bus = Arc::downgrade(&self.shared);
        let port = self
            .shared
            .registry
            .connect_with(label, &unit, || InputPort::new(bus, label, unit.clone(), protocol))?;
        Ok(InputConnection::new(port))
    }

    /// Connect an output unit to `label`
    pub fn connect_output<O: OutputProtocol>(
        &self,
        label: PortLabel,
        unit: Unit,
        protocol: O,
    ) -> Result<OutputConnection<O::Value>> {
        self.ensure_open()?;
        if unit.direction != Direction::Output {
            return Err(Error::InvalidParameter(format!("{} is not an output unit", unit.name)));
        }
        let bus = Arc::downgrade(&self.shared);
        let port = self
            .shared
            .registry
            .connect_with(label, &unit, || OutputPort::new(bus, label, unit.clone(), protocol))?;
        Ok(OutputConnection::new(port))
    }

    /// Release `label`; an unoccupied port is a no-op
    pub fn disconnect(&self, label: PortLabel) -> Result<()> {
        self.ensure_open()?;
        self.shared.registry.disconnect(label.port_id())
    }

    /// Type-erased occupant of `label`
    pub fn connection(&self, label: PortLabel) -> Option<Arc<dyn PortConnection>> {
        self.shared.registry.get(label.port_id())
    }

    pub fn connected_ports(&self) -> Vec<PortId> {
        self.shared.registry.ports()
    }

    /// Change scanner, for inspecting active scan items
    pub fn scanner(&self) -> &ChangeScanner {
        &self.shared.scanner
    }

    /// Firmware version of the board as `major.minor.patch`
    pub fn firmware_version(&self) -> Result<String> {
        self.ensure_open()?;
        self.shared.framer.firmware_version()
    }

    /// Release every port, stop scanning and close the transport
    ///
    /// Per-port disconnect errors are logged and ignored. Closing twice is a
    /// no-op; every handle observes the closed bus.
    pub fn close(&self) -> Result<()> {
        self.shared.close()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}
