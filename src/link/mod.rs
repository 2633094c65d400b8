//! Device Link
//!
//! The single line-oriented channel to the motion controller. Everything
//! above this module talks to a [`LineTransport`]; the serial port and the
//! in-memory channel used for simulation are interchangeable behind it.
//!
//! A link is owned by exactly one session at a time and must be closed on
//! every exit path of that session.

pub mod channel;
pub mod serial;
pub mod simulator;

use async_trait::async_trait;
use std::time::Duration;

use crate::config::LinkConfig;
use crate::error::Result;

pub use channel::{ChannelLink, DeviceEnd};
pub use serial::{SerialConnector, SerialLink};
pub use simulator::{DeviceBehavior, SimulatedDevice, SimulatorConnector};

/// Boxed link as handed to a session
pub type Link = Box<dyn LineTransport>;

/// Line-oriented transport to the device
#[async_trait]
pub trait LineTransport: Send {
    /// Identifier of the underlying port
    fn port_name(&self) -> &str;

    /// Write `text` followed by a newline
    ///
    /// # Errors
    /// Returns `Disconnected` if the link is gone
    async fn write_line(&mut self, text: &str) -> Result<()>;

    /// Read one line, without its terminator
    ///
    /// Returns `Ok(None)` when nothing complete arrived within `timeout`.
    ///
    /// # Errors
    /// Returns `Disconnected` if the link is gone
    async fn read_line(&mut self, timeout: Duration) -> Result<Option<String>>;

    /// Discard everything received but not yet read
    async fn flush_input(&mut self) -> Result<()>;

    /// Release the link; later calls fail with `Disconnected`
    async fn close(&mut self) -> Result<()>;

    /// Traffic counters
    fn stats(&self) -> &LinkStats;
}

/// Opens links for sessions
#[async_trait]
pub trait LinkConnector: Send + Sync {
    /// Open and settle a link described by `config`
    ///
    /// # Errors
    /// Returns `ConnectionFailed` if the port cannot be opened
    async fn connect(&self, config: &LinkConfig) -> Result<Link>;
}

/// Link statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Lines written
    pub lines_written: u64,
    /// Lines read
    pub lines_read: u64,
    /// Reads that ended without a line
    pub read_timeouts: u64,
    /// Lines thrown away by `flush_input`
    pub lines_flushed: u64,
}

impl LinkStats {
    /// Reset all statistics
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Share of reads that timed out
    pub fn timeout_ratio(&self) -> f64 {
        let reads = self.lines_read + self.read_timeouts;
        if reads == 0 {
            0.0
        } else {
            self.read_timeouts as f64 / reads as f64
        }
    }
}

/// Strip line terminators the controller may send
pub(crate) fn trim_line(raw: &str) -> String {
    raw.trim_end_matches(['\r', '\n']).trim().to_string()
}
