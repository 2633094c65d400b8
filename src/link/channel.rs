//! Channel Link
//!
//! Bridges the [`LineTransport`] contract to a pair of `tokio::mpsc`
//! channels so a device can live in another task: a simulator, a test
//! script, or a relay to some other transport.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::{LineTransport, LinkStats};
use crate::error::{Error, Result};

/// Host side of a channel pair
pub struct ChannelLink {
    port: String,
    /// Lines coming from the device
    incoming: UnboundedReceiver<String>,
    /// Lines going to the device; `None` once closed
    outgoing: Option<UnboundedSender<String>>,
    stats: LinkStats,
}

/// Device side of a channel pair
pub struct DeviceEnd {
    /// Lines the host wrote, terminator stripped
    pub from_host: UnboundedReceiver<String>,
    /// Replies to the host
    pub to_host: UnboundedSender<String>,
}

impl DeviceEnd {
    /// Send one reply line; `false` once the host side is gone
    pub fn reply(&self, line: impl Into<String>) -> bool {
        self.to_host.send(line.into()).is_ok()
    }
}

impl ChannelLink {
    /// Create a connected host/device pair
    pub fn pair(port: impl Into<String>) -> (Self, DeviceEnd) {
        let (to_host, incoming) = mpsc::unbounded_channel::<String>();
        let (outgoing, from_host) = mpsc::unbounded_channel::<String>();
        (
            Self::from_channels(port, incoming, outgoing),
            DeviceEnd { from_host, to_host },
        )
    }

    /// Create a link from existing channels
    pub fn from_channels(
        port: impl Into<String>,
        incoming: UnboundedReceiver<String>,
        outgoing: UnboundedSender<String>,
    ) -> Self {
        Self {
            port: port.into(),
            incoming,
            outgoing: Some(outgoing),
            stats: LinkStats::default(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.outgoing.is_none()
    }

    fn closed_error(&self) -> Error {
        Error::Disconnected {
            reason: format!("channel link {} closed", self.port),
        }
    }
}

#[async_trait]
impl LineTransport for ChannelLink {
    fn port_name(&self) -> &str {
        &self.port
    }

    async fn write_line(&mut self, text: &str) -> Result<()> {
        let sender = self.outgoing.as_ref().ok_or_else(|| self.closed_error())?;
        sender
            .send(text.to_string())
            .map_err(|_| Error::Disconnected {
                reason: format!("device on {} hung up", self.port),
            })?;
        self.stats.lines_written += 1;
        Ok(())
    }

    async fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        match tokio::time::timeout(timeout, self.incoming.recv()).await {
            Ok(Some(line)) => {
                self.stats.lines_read += 1;
                Ok(Some(super::trim_line(&line)))
            }
            Ok(None) => Err(Error::Disconnected {
                reason: format!("device on {} hung up", self.port),
            }),
            Err(_) => {
                self.stats.read_timeouts += 1;
                Ok(None)
            }
        }
    }

    async fn flush_input(&mut self) -> Result<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        while let Ok(line) = self.incoming.try_recv() {
            trace!("Flushed '{}' from {}", line, self.port);
            self.stats.lines_flushed += 1;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the sender is what the device side observes
        if self.outgoing.take().is_some() {
            self.incoming.close();
            debug!("Closed channel link {}", self.port);
        }
        Ok(())
    }

    fn stats(&self) -> &LinkStats {
        &self.stats
    }
}
