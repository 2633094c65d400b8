//! Serial Link
//!
//! [`LineTransport`] over a real serial port. Opening performs the settle
//! sequence GRBL needs: the board resets when the port opens, so we wait,
//! send a wake sequence, wait again and throw away the startup banner
//! before anything else is written.

use async_trait::async_trait;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

use super::{trim_line, LineTransport, Link, LinkConnector, LinkStats};
use crate::config::LinkConfig;
use crate::error::{Error, Result};

/// Serial port link to the controller
pub struct SerialLink {
    port: String,
    /// `None` once closed
    stream: Option<BufReader<SerialStream>>,
    /// Bytes of a line still being received
    pending: Vec<u8>,
    stats: LinkStats,
}

impl SerialLink {
    /// Open the port and run the settle sequence
    pub async fn open(config: &LinkConfig) -> Result<Self> {
        let port = config.port.clone();
        let baud_rate = config.baud_rate;
        let read_timeout = config.read_timeout();

        info!("Opening serial port {} at {} baud", port, baud_rate);

        // Opening can block on some platforms
        let path = port.clone();
        let stream = tokio::task::spawn_blocking(move || {
            tokio_serial::new(path, baud_rate)
                .timeout(read_timeout)
                .open_native_async()
        })
        .await
        .map_err(|e| Error::ConnectionFailed {
            port: port.clone(),
            reason: e.to_string(),
        })?
        .map_err(|e| Error::ConnectionFailed {
            port: port.clone(),
            reason: e.to_string(),
        })?;

        let mut link = Self {
            port,
            stream: Some(BufReader::new(stream)),
            pending: Vec::new(),
            stats: LinkStats::default(),
        };

        link.settle(config).await?;
        Ok(link)
    }

    /// Wait out the reboot, wake the interpreter, drop the banner
    async fn settle(&mut self, config: &LinkConfig) -> Result<()> {
        debug!("Waiting {:?} for controller reset", config.open_settle());
        tokio::time::sleep(config.open_settle()).await;

        let stream = self.stream_mut()?;
        stream
            .write_all(config.wake_sequence.as_bytes())
            .await
            .map_err(disconnected)?;
        stream.flush().await.map_err(disconnected)?;

        tokio::time::sleep(config.wake_settle()).await;
        self.flush_input().await
    }

    fn stream_mut(&mut self) -> Result<&mut BufReader<SerialStream>> {
        self.stream.as_mut().ok_or_else(|| Error::Disconnected {
            reason: "serial link already closed".to_string(),
        })
    }
}

fn disconnected(err: std::io::Error) -> Error {
    Error::Disconnected {
        reason: err.to_string(),
    }
}

#[async_trait]
impl LineTransport for SerialLink {
    fn port_name(&self) -> &str {
        &self.port
    }

    async fn write_line(&mut self, text: &str) -> Result<()> {
        let stream = self.stream_mut()?;
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(b'\n');
        stream.write_all(&bytes).await.map_err(disconnected)?;
        stream.flush().await.map_err(disconnected)?;
        self.stats.lines_written += 1;
        Ok(())
    }

    async fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::Disconnected {
                reason: "serial link already closed".to_string(),
            });
        };

        // `read_until` keeps partial bytes in `pending` across timeouts
        match tokio::time::timeout(timeout, stream.read_until(b'\n', &mut self.pending)).await {
            Err(_) => {
                self.stats.read_timeouts += 1;
                Ok(None)
            }
            Ok(Ok(0)) => Err(Error::Disconnected {
                reason: format!("end of stream on {}", self.port),
            }),
            Ok(Ok(_)) => {
                let line = trim_line(&String::from_utf8_lossy(&self.pending));
                self.pending.clear();
                self.stats.lines_read += 1;
                Ok(Some(line))
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => {
                self.stats.read_timeouts += 1;
                Ok(None)
            }
            Ok(Err(e)) => Err(disconnected(e)),
        }
    }

    async fn flush_input(&mut self) -> Result<()> {
        let stream = self.stream_mut()?;
        stream
            .get_ref()
            .clear(ClearBuffer::Input)
            .map_err(|e| Error::Disconnected {
                reason: e.to_string(),
            })?;
        let buffered = stream.buffer().len();
        Pin::new(&mut *stream).consume(buffered);
        if buffered > 0 || !self.pending.is_empty() {
            self.stats.lines_flushed += 1;
        }
        self.pending.clear();
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            // Dropping the stream releases the port even if the flush fails
            if let Err(e) = stream.flush().await {
                warn!("Flush on close of {} failed: {}", self.port, e);
            }
            info!("Closed serial port {}", self.port);
        }
        Ok(())
    }

    fn stats(&self) -> &LinkStats {
        &self.stats
    }
}

/// Connector that opens real serial ports
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector;

#[async_trait]
impl LinkConnector for SerialConnector {
    async fn connect(&self, config: &LinkConfig) -> Result<Link> {
        let link = SerialLink::open(config).await?;
        Ok(Box::new(link))
    }
}
