//! Change-scan scheduler
//!
//! One poll thread walks the set of scan items and hands every due item to a
//! small worker pool, so a slow device never delays the poll cadence.
//!
//! ```text
//!              add / remove (shrink period, wake)
//!                        │
//!   ┌────────────┐   Condvar   ┌──────────────┐  channel  ┌──────────────┐
//!   │ ScanItems  │◄────────────│  grove-poll  │──────────►│ grove-eval-N │
//!   └────────────┘   due list  └──────────────┘   jobs    └──────┬───────┘
//!                                                                 │ error
//!                                                  drop item ◄────┘
//! ```
//!
//! The poll period follows the smallest interval among the active items and
//! only ever shrinks while the task runs. Each item keeps its own due time
//! and skips missed slots instead of bursting to catch up.

use crate::connection::PortConnection;
use crate::error::{Error, Result};
use crate::port::PortId;
use crossbeam_channel::{Sender, unbounded};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Longest interval an item is scanned at; longer requests are capped
pub const MAX_SCAN_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

struct ScanItem {
    id: u64,
    port: PortId,
    interval: Duration,
    next_due: Instant,
    target: Weak<dyn PortConnection>,
    /// Set while an evaluation for this item is queued or running
    in_flight: Arc<AtomicBool>,
}

struct PollState {
    period: Duration,
    cancelled: bool,
}

/// Period and cancel flag shared with the poll thread
struct PollControl {
    state: Mutex<PollState>,
    wake: Condvar,
}

impl PollControl {
    fn new(period: Duration) -> Self {
        Self {
            state: Mutex::new(PollState {
                period,
                cancelled: false,
            }),
            wake: Condvar::new(),
        }
    }

    fn shrink_to(&self, period: Duration) {
        let mut state = self.state.lock();
        if period < state.period {
            log::debug!("Poll period {:?} -> {:?}", state.period, period);
            state.period = period;
            self.wake.notify_all();
        }
    }

    fn cancel(&self) {
        self.state.lock().cancelled = true;
        self.wake.notify_all();
    }

    fn period(&self) -> Duration {
        self.state.lock().period
    }

    fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    /// Block until `last_tick + period`; false once cancelled
    fn wait_next_tick(&self, last_tick: Instant) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.cancelled {
                return false;
            }
            let deadline = last_tick + state.period;
            if Instant::now() >= deadline {
                return true;
            }
            // Woken early when the period shrinks, then recompute the deadline
            self.wake.wait_until(&mut state, deadline);
        }
    }
}

struct PollTask {
    control: Arc<PollControl>,
    handle: Option<JoinHandle<()>>,
}

impl PollTask {
    fn stop(mut self) {
        self.control.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!("Poll thread panicked");
            }
        }
    }
}

/// Fixed set of evaluation threads fed from a channel
struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    fn new(size: usize) -> Result<Self> {
        let (sender, receiver) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(size);
        for i in 0..size.max(1) {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("grove-eval-{}", i))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                })
                .map_err(|e| Error::Other(format!("Failed to spawn evaluation worker: {}", e)))?;
            workers.push(handle);
        }
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    fn execute(&self, job: Job) -> bool {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        }
    }

    fn shutdown(&self) {
        // Dropping the sender ends the worker loops once the queue drains
        self.sender.lock().take();
        let workers = std::mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                log::error!("Evaluation worker panicked");
            }
        }
    }
}

struct ScanInner {
    /// Lock order: `task` before `items`
    task: Mutex<Option<PollTask>>,
    items: Mutex<Vec<ScanItem>>,
    min_interval: Duration,
    pool: WorkerPool,
    next_id: AtomicU64,
}

impl ScanInner {
    fn min_item_interval(items: &[ScanItem]) -> Option<Duration> {
        items.iter().map(|item| item.interval).min()
    }

    fn add(
        self: &Arc<Self>,
        port: PortId,
        interval: Duration,
        target: Weak<dyn PortConnection>,
    ) -> Result<()> {
        let interval = interval.clamp(self.min_interval, MAX_SCAN_INTERVAL);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut task = self.task.lock();
        let period = {
            let mut items = self.items.lock();
            items.push(ScanItem {
                id,
                port,
                interval,
                next_due: Instant::now(),
                target,
                in_flight: Arc::new(AtomicBool::new(false)),
            });
            Self::min_item_interval(&items).unwrap_or(interval)
        };
        log::debug!("Scanning {} every {:?}", port, interval);

        match task.as_ref() {
            Some(running) => running.control.shrink_to(period),
            None => match self.spawn_poll_task(period) {
                Ok(spawned) => *task = Some(spawned),
                Err(e) => {
                    self.items.lock().retain(|item| item.id != id);
                    return Err(e);
                }
            },
        }
        Ok(())
    }

    fn spawn_poll_task(self: &Arc<Self>, period: Duration) -> Result<PollTask> {
        let control = Arc::new(PollControl::new(period));
        let thread_control = Arc::clone(&control);
        let inner = Arc::downgrade(self);
        let handle = thread::Builder::new()
            .name("grove-poll".to_string())
            .spawn(move || poll_loop(inner, thread_control))
            .map_err(|e| Error::Other(format!("Failed to spawn poll thread: {}", e)))?;
        log::debug!("Poll task started at {:?}", period);
        Ok(PollTask {
            control,
            handle: Some(handle),
        })
    }

    /// Remove items matching `pred`, stopping the task when none remain
    fn remove_where<F>(&self, pred: F) -> usize
    where
        F: Fn(&ScanItem) -> bool,
    {
        let (removed, stopped) = {
            let mut task = self.task.lock();
            let (removed, remaining) = {
                let mut items = self.items.lock();
                let before = items.len();
                items.retain(|item| !pred(item));
                (before - items.len(), Self::min_item_interval(&items))
            };
            if removed == 0 {
                return 0;
            }
            let stopped = match remaining {
                Some(period) => {
                    if let Some(running) = task.as_ref() {
                        running.control.shrink_to(period);
                    }
                    None
                }
                None => task.take(),
            };
            (removed, stopped)
        };
        if let Some(task) = stopped {
            task.stop();
            log::debug!("Poll task stopped, no scan items left");
        }
        removed
    }

    /// Dispatch every due item to the worker pool
    fn run_due(self: &Arc<Self>, now: Instant) {
        let at = SystemTime::now();
        let mut dead = Vec::new();
        let mut items = self.items.lock();
        for item in items.iter_mut() {
            if item.target.strong_count() == 0 {
                dead.push(item.id);
                continue;
            }
            if item.next_due > now {
                continue;
            }
            while item.next_due <= now {
                item.next_due += item.interval;
            }
            if item.in_flight.swap(true, Ordering::AcqRel) {
                log::trace!("{} still evaluating, skipping slot", item.port);
                continue;
            }
            let Some(target) = item.target.upgrade() else {
                item.in_flight.store(false, Ordering::Release);
                continue;
            };

            let id = item.id;
            let port = item.port;
            let in_flight = Arc::clone(&item.in_flight);
            let scanner = Arc::downgrade(self);
            let job: Job = Box::new(move || {
                if let Err(e) = target.evaluate_scan(at) {
                    log::warn!("Scan of {} failed, dropping it: {}", port, e);
                    if let Some(scanner) = scanner.upgrade() {
                        scanner.remove_where(|item| item.id == id);
                    }
                }
                in_flight.store(false, Ordering::Release);
            });
            if !self.pool.execute(job) {
                item.in_flight.store(false, Ordering::Release);
            }
        }
        drop(items);

        if !dead.is_empty() {
            log::debug!("Pruning {} scan items of dropped connections", dead.len());
            self.remove_where(|item| dead.contains(&item.id));
        }
    }
}

fn poll_loop(inner: Weak<ScanInner>, control: Arc<PollControl>) {
    // The first pass runs immediately so new items are sampled right away
    let mut last_tick: Option<Instant> = None;
    loop {
        let proceed = match last_tick {
            Some(last) => control.wait_next_tick(last),
            None => !control.is_cancelled(),
        };
        if !proceed {
            break;
        }
        let now = Instant::now();
        last_tick = Some(now);
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.run_due(now);
    }
    log::trace!("Poll loop exited");
}

/// Background scheduler for subscribed input ports
pub struct ChangeScanner {
    inner: Arc<ScanInner>,
}

impl ChangeScanner {
    /// Create a scheduler
    ///
    /// # Arguments
    /// * `min_interval` - Floor applied to every requested sample interval
    /// * `workers` - Number of evaluation threads
    ///
    /// The floor must be positive and no longer than [`MAX_SCAN_INTERVAL`].
    pub fn new(min_interval: Duration, workers: usize) -> Result<Self> {
        if min_interval.is_zero() || min_interval > MAX_SCAN_INTERVAL {
            return Err(Error::InvalidParameter(format!(
                "minimum scan interval {:?} outside (0, {:?}]",
                min_interval, MAX_SCAN_INTERVAL
            )));
        }
        Ok(Self {
            inner: Arc::new(ScanInner {
                task: Mutex::new(None),
                items: Mutex::new(Vec::new()),
                min_interval,
                pool: WorkerPool::new(workers)?,
                next_id: AtomicU64::new(0),
            }),
        })
    }

    /// Start sampling `target` at `interval`, clamped between the minimum and
    /// [`MAX_SCAN_INTERVAL`]
    pub fn add_scan_item(
        &self,
        port: PortId,
        interval: Duration,
        target: Weak<dyn PortConnection>,
    ) -> Result<()> {
        self.inner.add(port, interval, target)
    }

    /// Stop sampling `port`; returns whether an item was removed
    pub fn remove_scan_item(&self, port: PortId) -> bool {
        self.inner.remove_where(|item| item.port == port) > 0
    }

    pub fn is_scanning(&self, port: PortId) -> bool {
        self.inner.items.lock().iter().any(|item| item.port == port)
    }

    /// Ports with an active scan item
    pub fn active_ports(&self) -> Vec<PortId> {
        self.inner.items.lock().iter().map(|item| item.port).collect()
    }

    pub fn item_count(&self) -> usize {
        self.inner.items.lock().len()
    }

    /// Effective interval of the item scanning `port`
    pub fn scan_interval(&self, port: PortId) -> Option<Duration> {
        self.inner
            .items
            .lock()
            .iter()
            .find(|item| item.port == port)
            .map(|item| item.interval)
    }

    /// Current poll period, `None` while idle
    pub fn poll_period(&self) -> Option<Duration> {
        self.inner
            .task
            .lock()
            .as_ref()
            .map(|task| task.control.period())
    }

    pub fn is_running(&self) -> bool {
        self.inner.task.lock().is_some()
    }

    pub fn min_interval(&self) -> Duration {
        self.inner.min_interval
    }

    /// Drop all items, stop the poll task and the worker pool
    pub fn shutdown(&self) {
        let task = {
            let mut task = self.inner.task.lock();
            self.inner.items.lock().clear();
            task.take()
        };
        if let Some(task) = task {
            task.stop();
        }
        self.inner.pool.shutdown();
        log::debug!("Scanner shut down");
    }
}

impl Drop for ChangeScanner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::port::{PortKind, PortLabel};
    use crate::unit::Unit;
    use std::any::Any;
    use std::sync::atomic::AtomicUsize;

    struct Probe {
        label: PortLabel,
        unit: Unit,
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl Probe {
        fn new(label: PortLabel) -> Arc<Self> {
            Arc::new(Self {
                label,
                unit: Unit::input("Probe", &[label.kind()], Duration::from_millis(5)),
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PortConnection for Probe {
        fn label(&self) -> PortLabel {
            self.label
        }
        fn unit(&self) -> &Unit {
            &self.unit
        }
        fn is_connected(&self) -> bool {
            true
        }
        fn connect(&self) -> Result<()> {
            Ok(())
        }
        fn disconnect(&self) -> Result<()> {
            Ok(())
        }
        fn evaluate_scan(&self, _at: SystemTime) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Other("probe failure".to_string()));
            }
            Ok(())
        }
        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    fn weak(probe: &Arc<Probe>) -> Weak<dyn PortConnection> {
        let target: Arc<dyn PortConnection> = probe.clone();
        Arc::downgrade(&target)
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_interval_is_floored() {
        let scanner = ChangeScanner::new(Duration::from_millis(10), 1).unwrap();
        let probe = Probe::new(PortLabel::D2);
        let port = probe.label.port_id();

        scanner
            .add_scan_item(port, Duration::from_micros(100), weak(&probe))
            .unwrap();

        assert_eq!(scanner.scan_interval(port), Some(Duration::from_millis(10)));
        assert_eq!(scanner.poll_period(), Some(Duration::from_millis(10)));
        scanner.shutdown();
    }

    #[test]
    fn test_zero_floor_is_rejected() {
        assert!(matches!(
            ChangeScanner::new(Duration::ZERO, 1),
            Err(Error::InvalidParameter(_))
        ));
        assert!(ChangeScanner::new(MAX_SCAN_INTERVAL + Duration::from_secs(1), 1).is_err());
    }

    #[test]
    fn test_huge_interval_is_capped() {
        let scanner = ChangeScanner::new(Duration::from_millis(1), 2).unwrap();
        let fast = Probe::new(PortLabel::D2);
        let idle = Probe::new(PortLabel::D3);

        scanner
            .add_scan_item(fast.label.port_id(), Duration::from_millis(5), weak(&fast))
            .unwrap();
        scanner
            .add_scan_item(idle.label.port_id(), Duration::from_secs(u64::MAX), weak(&idle))
            .unwrap();
        assert_eq!(
            scanner.scan_interval(idle.label.port_id()),
            Some(MAX_SCAN_INTERVAL)
        );

        // The poll thread survives the first pass over both items
        let calls = fast.calls();
        assert!(wait_for(|| fast.calls() > calls + 5));
        assert!(wait_for(|| idle.calls() == 1));
        assert_eq!(scanner.item_count(), 2);
        scanner.shutdown();
    }

    #[test]
    fn test_period_shrinks_only() {
        let scanner = ChangeScanner::new(Duration::from_millis(1), 1).unwrap();
        let slow = Probe::new(PortLabel::D2);
        let fast = Probe::new(PortLabel::D3);

        scanner
            .add_scan_item(slow.label.port_id(), Duration::from_millis(500), weak(&slow))
            .unwrap();
        assert_eq!(scanner.poll_period(), Some(Duration::from_millis(500)));

        scanner
            .add_scan_item(fast.label.port_id(), Duration::from_millis(50), weak(&fast))
            .unwrap();
        assert_eq!(scanner.poll_period(), Some(Duration::from_millis(50)));

        // Removing the fast item does not grow the period back
        assert!(scanner.remove_scan_item(fast.label.port_id()));
        assert_eq!(scanner.poll_period(), Some(Duration::from_millis(50)));
        assert_eq!(scanner.active_ports(), vec![slow.label.port_id()]);
        scanner.shutdown();
    }

    #[test]
    fn test_task_stops_when_empty() {
        let scanner = ChangeScanner::new(Duration::from_millis(1), 1).unwrap();
        let probe = Probe::new(PortLabel::A0);
        let port = probe.label.port_id();

        scanner
            .add_scan_item(port, Duration::from_millis(5), weak(&probe))
            .unwrap();
        assert!(scanner.is_running());
        assert!(wait_for(|| probe.calls() >= 2));

        assert!(scanner.remove_scan_item(port));
        assert!(!scanner.is_running());
        assert!(!scanner.remove_scan_item(port));
        scanner.shutdown();
    }

    #[test]
    fn test_failing_item_is_dropped() {
        let scanner = ChangeScanner::new(Duration::from_millis(1), 2).unwrap();
        let good = Probe::new(PortLabel::A1);
        let bad = Probe::new(PortLabel::A2);
        bad.fail.store(true, Ordering::SeqCst);

        scanner
            .add_scan_item(good.label.port_id(), Duration::from_millis(5), weak(&good))
            .unwrap();
        scanner
            .add_scan_item(bad.label.port_id(), Duration::from_millis(5), weak(&bad))
            .unwrap();

        assert!(wait_for(|| !scanner.is_scanning(bad.label.port_id())));
        let bad_calls = bad.calls();
        let good_calls = good.calls();
        assert!(wait_for(|| good.calls() > good_calls + 2));
        assert_eq!(bad.calls(), bad_calls);
        assert!(scanner.is_scanning(PortId::new(PortKind::Analogue, 1)));
        scanner.shutdown();
    }

    #[test]
    fn test_dead_targets_are_pruned() {
        let scanner = ChangeScanner::new(Duration::from_millis(1), 1).unwrap();
        let probe = Probe::new(PortLabel::D4);
        scanner
            .add_scan_item(probe.label.port_id(), Duration::from_millis(5), weak(&probe))
            .unwrap();
        drop(probe);

        assert!(wait_for(|| scanner.item_count() == 0));
        scanner.shutdown();
    }
}
