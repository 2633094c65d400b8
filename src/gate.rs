//! Status Gate
//!
//! The controller acknowledges a motion command once it is queued, not
//! once it has finished, so every command is fenced by an explicit
//! readiness check: send a status query, wait one poll interval, read one
//! reply and classify it. Polling repeats until the device is idle (or
//! acknowledges) or the gate's wait budget runs out.

use std::time::Duration;
use tokio::time::Instant;

use crate::config::{Config, ResponseTokens};
use crate::error::{Error, Result};
use crate::link::LineTransport;
use crate::models::{DeviceStatus, Position, StatusReport};

/// Result of a successful gate pass
#[derive(Debug, Clone, PartialEq)]
pub struct GateReport {
    /// Queries sent before the device was ready
    pub polls: u32,
    /// Status that opened the gate
    pub status: DeviceStatus,
    /// Last position seen in a status report during this pass
    pub position: Option<Position>,
}

/// Blocks a session until the device is ready for the next command
#[derive(Debug, Clone)]
pub struct StatusGate {
    query: String,
    poll_interval: Duration,
    max_wait: Duration,
    read_timeout: Duration,
    tokens: ResponseTokens,
}

impl StatusGate {
    pub fn new(config: &Config) -> Self {
        Self {
            query: config.gate.status_query.clone(),
            poll_interval: config.gate.poll_interval(),
            max_wait: config.gate.max_wait(),
            read_timeout: config.link.read_timeout(),
            tokens: config.responses.clone(),
        }
    }

    /// Poll until the device reports Idle or Acknowledged
    ///
    /// # Errors
    /// `DeviceNotReady` once `max_wait` elapses without a ready reply;
    /// `Disconnected` if the link fails
    pub async fn await_ready(&self, link: &mut dyn LineTransport) -> Result<GateReport> {
        let started = Instant::now();
        let mut polls = 0;
        let mut position = None;

        loop {
            link.flush_input().await?;
            link.write_line(&self.query).await?;
            polls += 1;
            tokio::time::sleep(self.poll_interval).await;

            let reply = link.read_line(self.read_timeout).await?.unwrap_or_default();
            let status = DeviceStatus::classify(&reply, &self.tokens);
            if let Some(report) = StatusReport::parse(&reply) {
                position = report.position.or(position);
            }
            trace!("Status poll {}: '{}' -> {}", polls, reply, status.describe());

            if status.is_ready() {
                return Ok(GateReport {
                    polls,
                    status,
                    position,
                });
            }

            let waited = started.elapsed();
            if waited >= self.max_wait {
                return Err(Error::DeviceNotReady {
                    waited,
                    last_status: status.describe(),
                });
            }
        }
    }
}
