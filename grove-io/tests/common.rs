//! Test utilities for GroveIO integration tests.
//!
//! Builds buses over the mock transport and records listener notifications.

#![allow(dead_code)]

use grove_io::transport::MockTransport;
use grove_io::{BusConfig, GroveBus, ValueListener};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

/// Bus over a fresh mock transport with a 1ms scan floor.
pub fn mock_bus() -> (GroveBus, MockTransport) {
    mock_bus_with(BusConfig {
        evaluation_workers: 2,
        ..BusConfig::default()
    })
}

pub fn mock_bus_with(config: BusConfig) -> (GroveBus, MockTransport) {
    let mock = MockTransport::new();
    let bus = GroveBus::with_transport(Box::new(mock.clone()), &config).unwrap();
    (bus, mock)
}

/// Poll `cond` until it holds or two seconds pass.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Listener that keeps every notified value.
pub struct Recorder<V> {
    values: Mutex<Vec<V>>,
}

impl<V: Clone> Recorder<V> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            values: Mutex::new(Vec::new()),
        })
    }

    pub fn values(&self) -> Vec<V> {
        self.values.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.values.lock().len()
    }
}

impl<V: Clone + Send + Sync> ValueListener<V> for Recorder<V> {
    fn value_changed(&self, value: &V, _at: SystemTime) {
        self.values.lock().push(value.clone());
    }
}
