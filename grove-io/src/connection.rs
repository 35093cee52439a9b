//! Port connections
//!
//! A connection binds one (port, unit, protocol) triple to the bus. It holds
//! only a weak reference to the bus, so every operation first checks that
//! the bus is still there and fails with [`Error::DisconnectedBus`] if not.
//!
//! ```text
//!   Disconnected ──connect()──► Connected
//!        ▲    (set pin mode)        │
//!        └─────disconnect()─────────┘
//!          (drop listeners, stop scan)
//! ```
//!
//! The registry and the scanner only see [`PortConnection`] trait objects.
//! Clients hold [`InputConnection`] / [`OutputConnection`] handles that are
//! typed by value only, not by protocol adapter.

use crate::bus::BusShared;
use crate::error::{Error, Result};
use crate::fanout::{Fanout, ValueListener};
use crate::port::{PortId, PortKind, PortLabel};
use crate::protocol::{InputProtocol, OutputProtocol};
use crate::unit::Unit;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

/// Type-erased view of a connection used by the registry and the scanner
pub trait PortConnection: Send + Sync {
    fn label(&self) -> PortLabel;

    fn port_id(&self) -> PortId {
        self.label().port_id()
    }

    fn unit(&self) -> &Unit;

    fn is_connected(&self) -> bool;

    /// Establish the connection; no-op when already connected
    fn connect(&self) -> Result<()>;

    /// Tear down listeners and scanning; no-op when already disconnected
    fn disconnect(&self) -> Result<()>;

    /// Sample once and notify listeners if the change is significant
    fn evaluate_scan(&self, at: SystemTime) -> Result<()>;

    /// Recover the concrete connection type
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// State shared by input and output connections
struct PortLink {
    bus: Weak<BusShared>,
    label: PortLabel,
    unit: Unit,
    connected: Mutex<bool>,
}

impl PortLink {
    fn new(bus: Weak<BusShared>, label: PortLabel, unit: Unit) -> Self {
        Self {
            bus,
            label,
            unit,
            connected: Mutex::new(false),
        }
    }

    fn bus(&self) -> Result<Arc<BusShared>> {
        match self.bus.upgrade() {
            Some(bus) if !bus.is_closed() => Ok(bus),
            _ => Err(Error::DisconnectedBus),
        }
    }

    /// The bus, provided this port is still connected
    fn active_bus(&self) -> Result<Arc<BusShared>> {
        let bus = self.bus()?;
        if !*self.connected.lock() {
            return Err(Error::DisconnectedPort(self.label.to_string()));
        }
        Ok(bus)
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    fn connect(&self) -> Result<()> {
        let mut connected = self.connected.lock();
        if *connected {
            return Ok(());
        }
        let bus = self.bus()?;
        // Only board pins have a direction; bus connectors are passed through
        if matches!(self.label.kind(), PortKind::Analogue | PortKind::Digital) {
            bus.framer
                .set_io_mode(self.label.id(), self.unit.direction.io_mode())?;
        }
        *connected = true;
        log::info!("Connected {} to {}", self.unit.name, self.label);
        Ok(())
    }

    /// Flip to disconnected; returns false when it already was
    fn mark_disconnected(&self) -> bool {
        let mut connected = self.connected.lock();
        if !*connected {
            return false;
        }
        *connected = false;
        log::info!("Disconnected {} from {}", self.unit.name, self.label);
        true
    }
}

/// Connection of a sampled input device
pub struct InputPort<P: InputProtocol> {
    link: PortLink,
    protocol: P,
    listeners: Fanout<P::Value>,
    last_reported: Mutex<Option<P::Value>>,
    /// Serializes listener changes with scan (de)registration
    subscription: Mutex<()>,
    this: Weak<InputPort<P>>,
}

impl<P: InputProtocol> InputPort<P> {
    pub(crate) fn new(bus: Weak<BusShared>, label: PortLabel, unit: Unit, protocol: P) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            link: PortLink::new(bus, label, unit),
            protocol,
            listeners: Fanout::new(),
            last_reported: Mutex::new(None),
            subscription: Mutex::new(()),
            this: this.clone(),
        })
    }

    fn sample_interval(&self) -> Duration {
        self.link.unit.sample_interval().unwrap_or_default()
    }

    fn read_with(&self, bus: &BusShared) -> Result<P::Value> {
        let request = self.protocol.read_request();
        let bytes = bus.framer.read_command(self.link.label.id(), &request)?;
        self.protocol.convert(&bytes)
    }

    pub fn read_value(&self) -> Result<P::Value> {
        let bus = self.link.active_bus()?;
        self.read_with(&bus)
    }

    pub fn add_listener(&self, listener: &Arc<dyn ValueListener<P::Value>>) -> Result<()> {
        let bus = self.link.active_bus()?;
        let _guard = self.subscription.lock();
        self.listeners.add(listener);
        if !bus.scanner.is_scanning(self.link.label.port_id()) {
            let target: Weak<dyn PortConnection> = self.this.clone();
            bus.scanner
                .add_scan_item(self.link.label.port_id(), self.sample_interval(), target)?;
        }
        Ok(())
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ValueListener<P::Value>>) -> Result<()> {
        let bus = self.link.active_bus()?;
        let _guard = self.subscription.lock();
        if self.listeners.remove(listener) == 0 {
            bus.scanner.remove_scan_item(self.link.label.port_id());
        }
        Ok(())
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Stop scanning once every listener has been dropped by its owner
    fn release_idle_scan(&self, bus: &BusShared) {
        let _guard = self.subscription.lock();
        if self.listeners.is_empty() {
            log::debug!("No listeners left on {}, stopping scan", self.link.label);
            bus.scanner.remove_scan_item(self.link.label.port_id());
        }
    }
}

impl<P: InputProtocol> PortConnection for InputPort<P> {
    fn label(&self) -> PortLabel {
        self.link.label
    }

    fn unit(&self) -> &Unit {
        &self.link.unit
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    fn connect(&self) -> Result<()> {
        self.link.connect()
    }

    fn disconnect(&self) -> Result<()> {
        let _guard = self.subscription.lock();
        if !self.link.mark_disconnected() {
            return Ok(());
        }
        self.listeners.remove_all();
        self.last_reported.lock().take();
        // A torn-down bus has already dropped its scan items
        if let Some(bus) = self.link.bus.upgrade() {
            bus.scanner.remove_scan_item(self.link.label.port_id());
        }
        Ok(())
    }

    fn evaluate_scan(&self, at: SystemTime) -> Result<()> {
        let bus = self.link.active_bus()?;
        let value = self.read_with(&bus)?;

        let report = {
            let mut last = self.last_reported.lock();
            let significant = match last.as_ref() {
                None => true,
                Some(previous) => self.protocol.is_significant(&value, previous),
            };
            if significant {
                *last = Some(value.clone());
            }
            significant
        };

        if report {
            log::debug!("{} changed to {:?}", self.link.label, value);
            if self.listeners.invoke(&value, at) == 0 {
                self.release_idle_scan(&bus);
            }
        }
        Ok(())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Connection of an output device
pub struct OutputPort<O: OutputProtocol> {
    link: PortLink,
    protocol: O,
}

impl<O: OutputProtocol> OutputPort<O> {
    pub(crate) fn new(bus: Weak<BusShared>, label: PortLabel, unit: Unit, protocol: O) -> Arc<Self> {
        Arc::new(Self {
            link: PortLink::new(bus, label, unit),
            protocol,
        })
    }

    pub fn write_value(&self, value: &O::Value) -> Result<()> {
        let bus = self.link.active_bus()?;
        log::trace!("{} <- {:?}", self.link.label, value);
        self.protocol
            .write(value, self.link.label.port_id(), &bus.framer)
    }
}

impl<O: OutputProtocol> PortConnection for OutputPort<O> {
    fn label(&self) -> PortLabel {
        self.link.label
    }

    fn unit(&self) -> &Unit {
        &self.link.unit
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    fn connect(&self) -> Result<()> {
        self.link.connect()
    }

    fn disconnect(&self) -> Result<()> {
        self.link.mark_disconnected();
        Ok(())
    }

    fn evaluate_scan(&self, _at: SystemTime) -> Result<()> {
        Err(Error::InvalidParameter(format!(
            "{} is an output and cannot be scanned",
            self.link.label
        )))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Value-typed view of an input port, hiding the protocol adapter
trait InputSource<V>: PortConnection {
    fn read_value(&self) -> Result<V>;
    fn add_listener(&self, listener: &Arc<dyn ValueListener<V>>) -> Result<()>;
    fn remove_listener(&self, listener: &Arc<dyn ValueListener<V>>) -> Result<()>;
    fn listener_count(&self) -> usize;
}

impl<P: InputProtocol> InputSource<P::Value> for InputPort<P> {
    fn read_value(&self) -> Result<P::Value> {
        InputPort::read_value(self)
    }

    fn add_listener(&self, listener: &Arc<dyn ValueListener<P::Value>>) -> Result<()> {
        InputPort::add_listener(self, listener)
    }

    fn remove_listener(&self, listener: &Arc<dyn ValueListener<P::Value>>) -> Result<()> {
        InputPort::remove_listener(self, listener)
    }

    fn listener_count(&self) -> usize {
        InputPort::listener_count(self)
    }
}

/// Value-typed view of an output port
trait OutputSink<V>: PortConnection {
    fn write_value(&self, value: &V) -> Result<()>;
}

impl<O: OutputProtocol> OutputSink<O::Value> for OutputPort<O> {
    fn write_value(&self, value: &O::Value) -> Result<()> {
        OutputPort::write_value(self, value)
    }
}

/// Client handle of an input connection
///
/// Handles compare equal when they refer to the same underlying connection.
pub struct InputConnection<V: 'static> {
    source: Arc<dyn InputSource<V>>,
}

impl<V: 'static> InputConnection<V> {
    pub(crate) fn new<P: InputProtocol<Value = V>>(port: Arc<InputPort<P>>) -> Self {
        Self { source: port }
    }

    pub fn label(&self) -> PortLabel {
        self.source.label()
    }

    pub fn unit(&self) -> &Unit {
        self.source.unit()
    }

    pub fn is_connected(&self) -> bool {
        self.source.is_connected()
    }

    /// Read the current value from the device
    pub fn read_value(&self) -> Result<V> {
        self.source.read_value()
    }

    /// Subscribe to significant changes
    ///
    /// The connection only keeps a weak reference; the listener stays
    /// subscribed for as long as the caller holds the `Arc`.
    pub fn add_listener<L: ValueListener<V> + 'static>(&self, listener: &Arc<L>) -> Result<()> {
        let listener: Arc<dyn ValueListener<V>> = listener.clone();
        self.source.add_listener(&listener)
    }

    pub fn remove_listener<L: ValueListener<V> + 'static>(&self, listener: &Arc<L>) -> Result<()> {
        let listener: Arc<dyn ValueListener<V>> = listener.clone();
        self.source.remove_listener(&listener)
    }

    pub fn listener_count(&self) -> usize {
        self.source.listener_count()
    }

    pub fn connect(&self) -> Result<()> {
        self.source.connect()
    }

    pub fn disconnect(&self) -> Result<()> {
        self.source.disconnect()
    }
}

impl<V: 'static> Clone for InputConnection<V> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<V: 'static> PartialEq for InputConnection<V> {
    fn eq(&self, other: &Self) -> bool {
        Arc::as_ptr(&self.source) as *const () == Arc::as_ptr(&other.source) as *const ()
    }
}

impl<V: 'static> Eq for InputConnection<V> {}

impl<V: 'static> fmt::Debug for InputConnection<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputConnection")
            .field("label", &self.label())
            .field("unit", &self.unit().name)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Client handle of an output connection
pub struct OutputConnection<V: 'static> {
    sink: Arc<dyn OutputSink<V>>,
}

impl<V: 'static> OutputConnection<V> {
    pub(crate) fn new<O: OutputProtocol<Value = V>>(port: Arc<OutputPort<O>>) -> Self {
        Self { sink: port }
    }

    pub fn label(&self) -> PortLabel {
        self.sink.label()
    }

    pub fn unit(&self) -> &Unit {
        self.sink.unit()
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_connected()
    }

    pub fn write_value(&self, value: &V) -> Result<()> {
        self.sink.write_value(value)
    }

    pub fn connect(&self) -> Result<()> {
        self.sink.connect()
    }

    pub fn disconnect(&self) -> Result<()> {
        self.sink.disconnect()
    }
}

impl<V: 'static> Clone for OutputConnection<V> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<V: 'static> PartialEq for OutputConnection<V> {
    fn eq(&self, other: &Self) -> bool {
        Arc::as_ptr(&self.sink) as *const () == Arc::as_ptr(&other.sink) as *const ()
    }
}

impl<V: 'static> Eq for OutputConnection<V> {}

impl<V: 'static> fmt::Debug for OutputConnection<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputConnection")
            .field("label", &self.label())
            .field("unit", &self.unit().name)
            .field("connected", &self.is_connected())
            .finish()
    }
}
