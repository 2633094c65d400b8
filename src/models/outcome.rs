//! Command Outcome Model
//!
//! What happened to each command of a program: executed on some attempt,
//! or abandoned for a recorded reason.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of handing one command to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchOutcome {
    /// Acknowledged on attempt number `attempts`
    Executed { attempts: u32 },
    /// Every attempt went unacknowledged
    Abandoned {
        attempts: u32,
        last_response: Option<String>,
    },
}

impl DispatchOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, DispatchOutcome::Executed { .. })
    }

    /// Number of times the command was written
    pub fn attempts(&self) -> u32 {
        match self {
            DispatchOutcome::Executed { attempts } | DispatchOutcome::Abandoned { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Why a command was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbandonReason {
    /// Could not be rewritten for the device; never sent
    Transform { message: String },
    /// Device never became ready; never sent
    NotReady { message: String },
    /// Sent, but no acknowledgment within any attempt
    NoAcknowledgment {
        attempts: u32,
        last_response: Option<String>,
    },
}

impl fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbandonReason::Transform { message } => write!(f, "transform failed: {}", message),
            AbandonReason::NotReady { message } => write!(f, "device not ready: {}", message),
            AbandonReason::NoAcknowledgment {
                attempts,
                last_response: Some(last),
            } => write!(f, "no acknowledgment after {} attempts (last reply '{}')", attempts, last),
            AbandonReason::NoAcknowledgment {
                attempts,
                last_response: None,
            } => write!(f, "no acknowledgment after {} attempts", attempts),
        }
    }
}

/// Terminal outcome of a command within a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOutcome {
    Executed { attempts: u32 },
    Abandoned(AbandonReason),
}

impl CommandOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, CommandOutcome::Executed { .. })
    }
}

impl From<DispatchOutcome> for CommandOutcome {
    fn from(outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Executed { attempts } => CommandOutcome::Executed { attempts },
            DispatchOutcome::Abandoned {
                attempts,
                last_response,
            } => CommandOutcome::Abandoned(AbandonReason::NoAcknowledgment {
                attempts,
                last_response,
            }),
        }
    }
}

/// One row of the session report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Source line in the program file
    pub line: usize,

    /// Command as read from the program
    pub original: String,

    /// Command as sent, when the transform succeeded
    pub transformed: Option<String>,

    pub outcome: CommandOutcome,
}
