//! Dispatcher
//!
//! Sends one command and waits for its acknowledgment. Each command runs a
//! small state machine:
//!
//! ```text
//! Attempting(retry_max) --ack--> Executed
//!        |
//!   window elapsed
//!        v
//! Attempting(k - 1) ... Attempting(1) --window elapsed--> Abandoned
//! ```
//!
//! Every attempt writes the same text. The response window is wall-clock,
//! not a count of reads. Abandoning a command does not stop the caller
//! from sending the next one.

use std::time::Duration;
use tokio::time::Instant;

use crate::config::{Config, ResponseTokens};
use crate::error::Result;
use crate::link::LineTransport;
use crate::models::{Command, DispatchOutcome};

/// Per-command dispatch state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Attempts left, including the one about to be made
    Attempting(u32),
    Executed,
    Abandoned,
}

impl DispatchState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DispatchState::Attempting(_))
    }
}

/// Sends commands with bounded retry
#[derive(Debug, Clone)]
pub struct Dispatcher {
    retry_max: u32,
    write_settle: Duration,
    response_window: Duration,
    retry_backoff: Duration,
    read_timeout: Duration,
    tokens: ResponseTokens,
}

impl Dispatcher {
    pub fn new(config: &Config) -> Self {
        Self {
            retry_max: config.dispatch.retry_max.max(1),
            write_settle: config.dispatch.write_settle(),
            response_window: config.dispatch.response_window(),
            retry_backoff: config.dispatch.retry_backoff(),
            read_timeout: config.link.read_timeout(),
            tokens: config.responses.clone(),
        }
    }

    pub fn retry_max(&self) -> u32 {
        self.retry_max
    }

    /// Send `command` until it is acknowledged or attempts run out
    ///
    /// # Errors
    /// Only link failures; an unacknowledged command is an `Abandoned`
    /// outcome, not an error
    pub async fn send(
        &self,
        link: &mut dyn LineTransport,
        command: &Command,
    ) -> Result<DispatchOutcome> {
        let mut state = DispatchState::Attempting(self.retry_max);
        let mut attempts = 0;
        let mut last_response = None;

        while let DispatchState::Attempting(left) = state {
            attempts += 1;
            // Leftovers (a status query's trailing ok, a late ack) belong to earlier lines
            link.flush_input().await?;
            link.write_line(command.as_str()).await?;
            tokio::time::sleep(self.write_settle).await;

            if self.await_ack(link, command, &mut last_response).await? {
                state = DispatchState::Executed;
            } else if left > 1 {
                warn!(
                    "No response for '{}', retrying ({} attempts left)",
                    command,
                    left - 1
                );
                tokio::time::sleep(self.retry_backoff).await;
                state = DispatchState::Attempting(left - 1);
            } else {
                state = DispatchState::Abandoned;
            }
        }

        Ok(match state {
            DispatchState::Executed => DispatchOutcome::Executed { attempts },
            _ => DispatchOutcome::Abandoned {
                attempts,
                last_response,
            },
        })
    }

    /// Read replies until one carries the ack token or the window closes
    async fn await_ack(
        &self,
        link: &mut dyn LineTransport,
        command: &Command,
        last_response: &mut Option<String>,
    ) -> Result<bool> {
        let deadline = Instant::now() + self.response_window;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }

            let Some(reply) = link.read_line(remaining.min(self.read_timeout)).await? else {
                continue;
            };
            if reply.is_empty() {
                continue;
            }

            debug!("Sent: {}, Response: {}", command, reply);
            if self.tokens.is_ack(&reply) {
                return Ok(true);
            }
            *last_response = Some(reply);
        }
    }
}
