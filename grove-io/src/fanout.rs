//! Change notification fan-out
//!
//! Listeners are held weakly and matched by identity. A listener dropped by
//! its owner simply stops being called and is pruned on the next pass.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

/// Receiver of significant value changes
pub trait ValueListener<T>: Send + Sync {
    fn value_changed(&self, value: &T, at: SystemTime);
}

impl<T, F> ValueListener<T> for F
where
    F: Fn(&T, SystemTime) + Send + Sync,
{
    fn value_changed(&self, value: &T, at: SystemTime) {
        self(value, at)
    }
}

fn same_listener<T: 'static>(weak: &Weak<dyn ValueListener<T>>, target: *const ()) -> bool {
    weak.as_ptr() as *const () == target
}

/// Per-connection listener collection
pub struct Fanout<T: 'static> {
    listeners: Mutex<Vec<Weak<dyn ValueListener<T>>>>,
}

impl<T: 'static> Fanout<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Append a listener, returning the live count afterwards
    pub fn add(&self, listener: &Arc<dyn ValueListener<T>>) -> usize {
        let mut listeners = self.listeners.lock();
        listeners.retain(|w| w.strong_count() > 0);
        listeners.push(Arc::downgrade(listener));
        listeners.len()
    }

    /// Remove a listener by identity, returning the live count afterwards
    ///
    /// Removing a listener that is not registered is silent.
    pub fn remove(&self, listener: &Arc<dyn ValueListener<T>>) -> usize {
        let target = Arc::as_ptr(listener) as *const ();
        let mut listeners = self.listeners.lock();
        for i in (0..listeners.len()).rev() {
            if listeners[i].strong_count() == 0 || same_listener(&listeners[i], target) {
                listeners.remove(i);
            }
        }
        listeners.len()
    }

    pub fn remove_all(&self) {
        self.listeners.lock().clear();
    }

    /// Number of listeners still alive
    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every live listener once and return how many were called
    ///
    /// Listeners run outside the lock so they may add or remove listeners.
    pub fn invoke(&self, value: &T, at: SystemTime) -> usize {
        let live: Vec<Arc<dyn ValueListener<T>>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|w| w.strong_count() > 0);
            listeners.iter().rev().filter_map(Weak::upgrade).collect()
        };
        for listener in &live {
            listener.value_changed(value, at);
        }
        live.len()
    }
}

impl<T: 'static> Default for Fanout<T> {
    fn default() -> Self {
        Self::new()
    }
}
