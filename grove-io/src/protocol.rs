//! Protocol adapter traits
//!
//! An adapter describes how one device type talks to the board: which read
//! command to frame, how to decode the response, when a change is worth
//! reporting and how to put an output value on the wire. Adapters carry no
//! state of their own.

use crate::bus::framer::{CommandFramer, ReadRequest};
use crate::error::Result;
use crate::port::PortId;
use std::fmt::Debug;

/// Adapter for a sampled input device
pub trait InputProtocol: Send + Sync + 'static {
    type Value: Clone + Debug + Send + Sync + 'static;

    /// Read command, parameters, timing and response length
    fn read_request(&self) -> ReadRequest;

    /// Decode the value bytes of a response
    fn convert(&self, bytes: &[u8]) -> Result<Self::Value>;

    /// Whether `new` differs enough from the last reported value to notify
    fn is_significant(&self, new: &Self::Value, previous: &Self::Value) -> bool;
}

/// Adapter for an output device
pub trait OutputProtocol: Send + Sync + 'static {
    type Value: Debug + Send + Sync + 'static;

    /// Put `value` on the bus for the device on `port`
    ///
    /// Board-driven outputs issue a single framed command; bus-attached
    /// modules run their own transaction through
    /// [`CommandFramer::transaction`].
    fn write(&self, value: &Self::Value, port: PortId, framer: &CommandFramer) -> Result<()>;
}
