//! Core data models for tictacplot
//!
//! Commands and programs read from disk, device replies, per-command
//! outcomes and the session report handed back to the game loop.

pub mod command;
pub mod outcome;
pub mod program;
pub mod report;
pub mod status;

// Re-exports for convenience
pub use command::Command;
pub use outcome::{AbandonReason, CommandOutcome, CommandRecord, DispatchOutcome};
pub use program::{Program, Symbol};
pub use report::{SessionReport, SessionStatus};
pub use status::{DeviceStatus, Position, StatusReport};
