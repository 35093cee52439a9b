//! Mock transport for testing

use super::{BLOCK_LEN, FRAME_LEN, Transport};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// One primitive operation observed by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    Address(u16),
    Frame([u8; FRAME_LEN]),
    ByteData { register: u8, value: u8 },
    ReadByte,
    ReadBlock,
    Close,
}

/// Mock transport for unit testing
///
/// Reads are answered from responses scripted per `(command, port)` of the
/// most recent frame. Clones share state, so a test keeps one clone for
/// inspection and hands the other to the bus.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

struct MockTransportInner {
    events: Vec<TransportEvent>,
    last_frame: Option<[u8; FRAME_LEN]>,
    responses: HashMap<(u8, u8), Vec<u8>>,
    failing: HashSet<(u8, u8)>,
    fail_writes: bool,
    latency: Duration,
    closed: bool,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner {
                events: Vec::new(),
                last_frame: None,
                responses: HashMap::new(),
                failing: HashSet::new(),
                fail_writes: false,
                latency: Duration::ZERO,
                closed: false,
            })),
        }
    }

    /// Script the response bytes for reads following a `(command, port)` frame
    ///
    /// Byte 0 answers the status read; block reads return the bytes after
    /// the echoed command byte.
    pub fn set_response(&self, command: u8, port: u8, data: &[u8]) {
        self.inner
            .lock()
            .responses
            .insert((command, port), data.to_vec());
    }

    /// Make reads following a `(command, port)` frame fail
    pub fn fail_reads(&self, command: u8, port: u8) {
        self.inner.lock().failing.insert((command, port));
    }

    /// Clear a read failure set by [`fail_reads`](Self::fail_reads)
    pub fn heal_reads(&self, command: u8, port: u8) {
        self.inner.lock().failing.remove(&(command, port));
    }

    /// Make every write fail
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Delay applied to every primitive
    pub fn set_latency(&self, latency: Duration) {
        self.inner.lock().latency = latency;
    }

    /// Get all recorded events
    pub fn events(&self) -> Vec<TransportEvent> {
        self.inner.lock().events.clone()
    }

    /// Get all written command frames
    pub fn frames(&self) -> Vec<[u8; FRAME_LEN]> {
        self.inner
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                TransportEvent::Frame(frame) => Some(*frame),
                _ => None,
            })
            .collect()
    }

    /// Number of frames written with `command` for `port`
    pub fn frame_count(&self, command: u8, port: u8) -> usize {
        self.frames()
            .iter()
            .filter(|f| f[0] == command && f[1] == port)
            .count()
    }

    /// Clear recorded events
    pub fn clear_events(&self) {
        self.inner.lock().events.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    fn record(&self, event: TransportEvent) -> MockStep {
        let mut inner = self.inner.lock();
        inner.events.push(event);
        let key = inner.last_frame.map(|f| (f[0], f[1]));
        let failing = match event {
            TransportEvent::ReadByte | TransportEvent::ReadBlock => {
                key.is_some_and(|k| inner.failing.contains(&k))
            }
            TransportEvent::Frame(_) | TransportEvent::ByteData { .. } => inner.fail_writes,
            _ => false,
        };
        let response = key
            .and_then(|k| inner.responses.get(&k).cloned())
            .unwrap_or_default();
        MockStep {
            latency: inner.latency,
            failing,
            response,
            command: key.map(|k| k.0).unwrap_or(0),
        }
    }
}

struct MockStep {
    latency: Duration,
    failing: bool,
    response: Vec<u8>,
    command: u8,
}

impl MockStep {
    fn finish(&self, operation: &'static str) -> Result<()> {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        if self.failing {
            return Err(Error::TransportIo {
                operation,
                source: io::Error::other("injected failure"),
            });
        }
        Ok(())
    }
}

impl Transport for MockTransport {
    fn set_target_address(&mut self, address: u16) -> Result<()> {
        self.record(TransportEvent::Address(address))
            .finish("set_target_address")
    }

    fn write_frame(&mut self, frame: &[u8; FRAME_LEN]) -> Result<()> {
        self.record(TransportEvent::Frame(*frame)).finish("write_frame")?;
        self.inner.lock().last_frame = Some(*frame);
        Ok(())
    }

    fn write_byte_data(&mut self, register: u8, value: u8) -> Result<()> {
        self.record(TransportEvent::ByteData { register, value })
            .finish("write_byte_data")
    }

    fn read_byte(&mut self) -> Result<u8> {
        let step = self.record(TransportEvent::ReadByte);
        step.finish("read_byte")?;
        Ok(step.response.first().copied().unwrap_or(0))
    }

    fn read_block(&mut self, buffer: &mut [u8; BLOCK_LEN]) -> Result<()> {
        let step = self.record(TransportEvent::ReadBlock);
        step.finish("read_block")?;
        buffer.fill(0);
        buffer[0] = step.command;
        for (slot, byte) in buffer[1..].iter_mut().zip(step.response.iter()) {
            *slot = *byte;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.record(TransportEvent::Close);
        self.inner.lock().closed = true;
        Ok(())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}
