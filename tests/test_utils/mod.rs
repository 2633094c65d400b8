//! Test Utilities
//!
//! Program directories and session wiring shared by the integration and
//! contract tests. Links come from the simulated GRBL board in
//! `tictacplot::link::simulator`.

#![allow(dead_code)]


// Re-exports for convenience
pub use fixtures::{simulator, ProgramDir};
