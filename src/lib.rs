//! tictacplot - draw Tic-Tac-Toe moves on a GRBL pen plotter
//!
//! This library streams G-code programs from disk to a GRBL-class motion
//! controller over a serial line, one command at a time, and reports what
//! happened to every command.
//!
//! ## Features
//!
//! - **Status gating:** every command waits for the board to report `Idle`
//! - **Bounded retry:** each command gets a fixed number of attempts, each
//!   with a wall-clock acknowledgment window
//! - **Command rewriting:** dwell rounding and pen up/down normalization
//! - **Session reports:** per-command outcomes, so a degraded drawing is
//!   never mistaken for a complete one
//! - **Simulation:** a scripted GRBL board behind the same link contract
//! - **Configuration:** TOML or JSON files with built-in defaults
//!
//! ## Module Organization
//!
//! - [`config`] - Configuration loading and validation
//! - [`link`] - Serial, channel and simulated links to the device
//! - [`program`] - Program lookup and parsing
//! - [`transform`] - Command rewriting rules
//! - [`gate`] - Readiness polling before each command
//! - [`dispatch`] - Send, await acknowledgment, retry
//! - [`session`] - End-to-end program runs and the per-port manager
//! - [`models`] - Commands, programs, device status and reports
//! - [`mod@error`] - Error types and Result aliases
//!
//! ## Quick Start
//!
//! ```no_run
//! use tictacplot::{load_config, Session, Symbol};
//!
//! # async fn run() -> tictacplot::Result<()> {
//! let config = load_config(None)?;
//! let session = Session::new(config)?;
//!
//! // X in the centre cell
//! let report = session.play_move(Symbol::X, 1, 1).await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

#![allow(unexpected_cfgs)]

#[macro_use]
extern crate tracing;

pub mod config;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod link;
pub mod models;
pub mod program;
pub mod session;
pub mod transform;

use std::path::Path;

// Re-exports for core functionality
pub use config::{Config, GateTimeoutPolicy};
pub use error::{Error, ErrorKind, Result};
pub use session::{Session, SessionEvent, SessionHandle, SessionManager};

// Convenience re-exports for common types
pub use config::loader::ConfigLoader;
pub use dispatch::{DispatchState, Dispatcher};
pub use gate::StatusGate;
pub use link::{LineTransport, LinkConnector, SerialConnector, SimulatorConnector};
pub use models::{Command, CommandOutcome, Program, SessionReport, SessionStatus, Symbol};
pub use program::ProgramLoader;
pub use transform::Transformer;

// Version information
/// The current version of tictacplot from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The application name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// The application description from Cargo.toml
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Load configuration for a run
///
/// An explicit `path` must exist and parse. Without one, the default
/// search locations are tried and built-in defaults are used when nothing
/// is found or the file found is unusable.
///
/// # Errors
///
/// Returns an error only when an explicit `path` cannot be loaded or fails
/// validation.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    info!("Initializing {} v{}", NAME, VERSION);

    if let Some(path) = path {
        let config = ConfigLoader::load_from_path(path)?;
        info!("Configuration loaded from {}", path.display());
        return Ok(config);
    }

    match ConfigLoader::load() {
        Ok(config) => {
            info!("Configuration loaded from default location");
            Ok(config)
        }
        Err(Error::ConfigNotFound) => {
            debug!("No configuration file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load configuration: {}. Using defaults", e);
            Ok(Config::default())
        }
    }
}
