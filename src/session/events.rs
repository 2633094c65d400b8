//! Session Events
//!
//! Progress notifications streamed from a running session to whoever
//! spawned it, so a game loop can show what the plotter is doing while it
//! draws.

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::models::{Command, CommandRecord, SessionStatus};

/// Progress of one session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Link opened and program loaded
    Started {
        id: Uuid,
        program: String,
        port: String,
        commands: usize,
    },
    /// Origin reset written
    OriginSet,
    /// Command `index` (0-based) is about to be processed
    CommandStarted { index: usize, command: Command },
    /// Command `index` reached a terminal outcome
    CommandFinished { index: usize, record: CommandRecord },
    /// Link closed, report finalized
    Finished { id: Uuid, status: SessionStatus },
}

impl SessionEvent {
    pub fn is_finished(&self) -> bool {
        matches!(self, SessionEvent::Finished { .. })
    }
}

/// Sending half of the event stream; silent when nobody listens
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    sender: Option<UnboundedSender<SessionEvent>>,
}

impl EventSink {
    pub(crate) fn new(sender: UnboundedSender<SessionEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub(crate) fn none() -> Self {
        Self::default()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        if let Some(sender) = &self.sender {
            // The receiver going away must not disturb the session
            if sender.send(event).is_err() {
                trace!("Session event dropped, no listener");
            }
        }
    }
}
