//! Port occupancy table

use crate::connection::PortConnection;
use crate::error::{Error, Result};
use crate::port::{PortId, PortLabel};
use crate::unit::Unit;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps each port identity to the single connection occupying it
pub struct PortRegistry {
    ports: Mutex<HashMap<PortId, Arc<dyn PortConnection>>>,
    /// Held from the occupancy check until the new occupant is registered
    connecting: Mutex<()>,
}

/// Outcome of looking up an occupied port
enum Occupant<C> {
    Same(Arc<C>),
    Conflict,
}

fn match_occupant<C>(existing: &Arc<dyn PortConnection>, unit: &Unit) -> Occupant<C>
where
    C: PortConnection + Any,
{
    if existing.unit() != unit {
        return Occupant::Conflict;
    }
    match Arc::clone(existing).into_any().downcast::<C>() {
        Ok(same) => Occupant::Same(same),
        Err(_) => Occupant::Conflict,
    }
}

impl PortRegistry {
    pub fn new() -> Self {
        Self {
            ports: Mutex::new(HashMap::new()),
            connecting: Mutex::new(()),
        }
    }

    /// Connect `unit` on `label`, creating the connection with `create`
    ///
    /// A port already holding a structurally equal unit of the same
    /// connection type returns that connection unchanged. Connects are
    /// serialized so a caller that loses the port never touches its pin
    /// mode; lookups and disconnects only take the table lock and do not
    /// wait on the new connection's bus I/O.
    pub fn connect_with<C, F>(&self, label: PortLabel, unit: &Unit, create: F) -> Result<Arc<C>>
    where
        C: PortConnection + Any,
        F: FnOnce() -> Arc<C>,
    {
        let port = label.port_id();
        // Checked before occupancy: a unit that cannot use this kind of port
        // is a configuration error whoever holds the port
        if !unit.supports(port.kind) {
            return Err(Error::UnsupportedPortType {
                unit: unit.to_string(),
                port_kind: port.kind.to_string(),
            });
        }

        let _connecting = self.connecting.lock();
        let existing = self.ports.lock().get(&port).cloned();
        if let Some(existing) = existing {
            return match match_occupant::<C>(&existing, unit) {
                Occupant::Same(same) => {
                    log::debug!("{} already connected to {}", unit.name, label);
                    Ok(same)
                }
                Occupant::Conflict => Err(Error::PortOccupied(label.to_string())),
            };
        }

        let connection = create();
        connection.connect()?;
        let erased: Arc<dyn PortConnection> = connection.clone();
        self.ports.lock().insert(port, erased);
        Ok(connection)
    }

    /// Remove the occupant of `port` and disconnect it
    ///
    /// An empty port is a silent no-op.
    pub fn disconnect(&self, port: PortId) -> Result<()> {
        let removed = self.ports.lock().remove(&port);
        match removed {
            Some(connection) => connection.disconnect(),
            None => Ok(()),
        }
    }

    pub fn get(&self, port: PortId) -> Option<Arc<dyn PortConnection>> {
        self.ports.lock().get(&port).cloned()
    }

    pub fn ports(&self) -> Vec<PortId> {
        self.ports.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.ports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty the table, disconnecting every entry and ignoring failures
    pub fn drain(&self) -> usize {
        // Let a connect in progress finish so its port is released too
        let _connecting = self.connecting.lock();
        let drained: Vec<_> = self.ports.lock().drain().collect();
        for (port, connection) in &drained {
            if let Err(e) = connection.disconnect() {
                log::warn!("Ignoring error while disconnecting {}: {}", port, e);
            }
        }
        drained.len()
    }
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortKind;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};

    #[derive(Debug)]
    struct Stub {
        label: PortLabel,
        unit: Unit,
        connected: AtomicBool,
        connects: AtomicUsize,
        fail_disconnect: bool,
    }

    impl Stub {
        fn create(label: PortLabel, unit: &Unit) -> Arc<Self> {
            Arc::new(Self {
                label,
                unit: unit.clone(),
                connected: AtomicBool::new(false),
                connects: AtomicUsize::new(0),
                fail_disconnect: false,
            })
        }
    }

    impl PortConnection for Stub {
        fn label(&self) -> PortLabel {
            self.label
        }
        fn unit(&self) -> &Unit {
            &self.unit
        }
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
        fn connect(&self) -> Result<()> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }
        fn disconnect(&self) -> Result<()> {
            self.connected.store(false, Ordering::SeqCst);
            if self.fail_disconnect {
                return Err(Error::Other("stuck".to_string()));
            }
            Ok(())
        }
        fn evaluate_scan(&self, _at: SystemTime) -> Result<()> {
            Ok(())
        }
        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    fn button() -> Unit {
        Unit::input("Button", &[PortKind::Digital], Duration::from_millis(200))
    }

    #[test]
    fn test_reconnect_returns_existing() {
        let registry = PortRegistry::new();
        let unit = button();
        let first = registry
            .connect_with(PortLabel::D4, &unit, || Stub::create(PortLabel::D4, &unit))
            .unwrap();
        let second = registry
            .connect_with(PortLabel::D4, &button(), || Stub::create(PortLabel::D4, &unit))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.connects.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_different_unit_is_rejected() {
        let registry = PortRegistry::new();
        let unit = button();
        registry
            .connect_with(PortLabel::D4, &unit, || Stub::create(PortLabel::D4, &unit))
            .unwrap();

        let buzzer = Unit::output("Buzzer", &[PortKind::Digital]);
        let err = registry
            .connect_with(PortLabel::D4, &buzzer, || Stub::create(PortLabel::D4, &buzzer))
            .unwrap_err();
        assert!(matches!(err, Error::PortOccupied(ref p) if p == "D4"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_racing_connects_create_once() {
        let registry = PortRegistry::new();
        let unit = button();
        let created = AtomicUsize::new(0);

        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        registry.connect_with(PortLabel::D5, &unit, || {
                            created.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(2));
                            Stub::create(PortLabel::D5, &unit)
                        })
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(created.load(Ordering::SeqCst), 1);
        let first = results[0].as_ref().unwrap();
        for result in &results {
            assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
        }
        assert_eq!(first.connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsupported_port_kind() {
        let registry = PortRegistry::new();
        let unit = button();
        let err = registry
            .connect_with(PortLabel::A1, &unit, || Stub::create(PortLabel::A1, &unit))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedPortType { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_disconnect_missing_port_is_noop() {
        let registry = PortRegistry::new();
        registry.disconnect(PortLabel::D7.port_id()).unwrap();
    }

    #[test]
    fn test_drain_ignores_errors() {
        let registry = PortRegistry::new();
        let unit = button();
        let failing = registry
            .connect_with(PortLabel::D2, &unit, || {
                Arc::new(Stub {
                    fail_disconnect: true,
                    ..Arc::into_inner(Stub::create(PortLabel::D2, &unit)).unwrap()
                })
            })
            .unwrap();
        let healthy = registry
            .connect_with(PortLabel::D3, &unit, || Stub::create(PortLabel::D3, &unit))
            .unwrap();

        assert_eq!(registry.drain(), 2);
        assert!(registry.is_empty());
        assert!(!failing.is_connected());
        assert!(!healthy.is_connected());
    }
}
