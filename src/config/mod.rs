//! Configuration management for tictacplot
//!
//! Every knob a session needs lives in [`Config`], which is passed to the
//! session explicitly. Nothing here is process-global, so several sessions
//! can run side by side against different ports and program directories.

pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for tictacplot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial link settings
    pub link: LinkConfig,

    /// Where motion programs live
    pub program: ProgramConfig,

    /// Per-command send/acknowledge settings
    pub dispatch: DispatchConfig,

    /// Readiness polling before each command
    pub gate: GateConfig,

    /// Calibrated pen strokes
    pub pen: PenConfig,

    /// Tokens used to classify device replies
    pub responses: ResponseTokens,

    /// Session-wide behaviour
    pub session: SessionConfig,
}

/// Serial link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial port identifier (`/dev/ttyUSB0`, `COM10`, ...)
    pub port: String,

    /// Baud rate
    pub baud_rate: u32,

    /// Wait after opening the port; the controller reboots on connect
    pub open_settle_ms: u64,

    /// Bytes written to wake the interpreter after the open settle
    pub wake_sequence: String,

    /// Wait after the wake sequence before flushing the startup banner
    pub wake_settle_ms: u64,

    /// Upper bound for a single line read
    pub read_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: "COM10".to_string(),
            baud_rate: 115_200,
            open_settle_ms: 2000,
            wake_sequence: "\r\n\r\n".to_string(),
            wake_settle_ms: 2000,
            read_timeout_ms: 1000,
        }
    }
}

impl LinkConfig {
    pub fn open_settle(&self) -> Duration {
        Duration::from_millis(self.open_settle_ms)
    }

    pub fn wake_settle(&self) -> Duration {
        Duration::from_millis(self.wake_settle_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Program lookup configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgramConfig {
    /// Directory holding `.gcode` programs
    pub directory: PathBuf,

    /// Extension appended to names given without one
    pub extension: String,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("gcode"),
            extension: "gcode".to_string(),
        }
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Send attempts per command before it is abandoned
    pub retry_max: u32,

    /// Pause between writing a command and listening for its reply
    pub write_settle_ms: u64,

    /// Wall-clock window to wait for an acknowledgment per attempt
    pub response_window_ms: u64,

    /// Pause before re-sending after a silent window
    pub retry_backoff_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            retry_max: 5,
            write_settle_ms: 100,
            response_window_ms: 3000,
            retry_backoff_ms: 200,
        }
    }
}

impl DispatchConfig {
    pub fn write_settle(&self) -> Duration {
        Duration::from_millis(self.write_settle_ms)
    }

    pub fn response_window(&self) -> Duration {
        Duration::from_millis(self.response_window_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// What to do when the device never becomes ready in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateTimeoutPolicy {
    /// Skip the command (recorded as abandoned) and keep going
    #[default]
    Abandon,
    /// Abort the whole session
    Abort,
}

/// Status gate configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Status query sent to the device
    pub status_query: String,

    /// Wait between sending the query and reading the reply
    pub poll_interval_ms: u64,

    /// Give up waiting for readiness after this long
    pub max_wait_ms: u64,

    /// Behaviour when `max_wait_ms` elapses
    pub on_timeout: GateTimeoutPolicy,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            status_query: "?".to_string(),
            poll_interval_ms: 500,
            max_wait_ms: 30_000,
            on_timeout: GateTimeoutPolicy::Abandon,
        }
    }
}

impl GateConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// Pen stroke calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenConfig {
    /// Z target of the pen-up stroke (negative)
    pub up_z: f64,

    /// Z target of the pen-down stroke (non-negative)
    pub down_z: f64,

    /// Feed rate used by both strokes
    pub feed_rate: f64,
}

impl Default for PenConfig {
    fn default() -> Self {
        Self {
            up_z: -5.0,
            down_z: 5.0,
            feed_rate: 1000.0,
        }
    }
}

impl PenConfig {
    /// Command that lifts the pen
    pub fn up_stroke(&self) -> String {
        format!("G1 Z{} F{}", self.up_z, self.feed_rate)
    }

    /// Command that lowers the pen
    pub fn down_stroke(&self) -> String {
        format!("G1 Z{} F{}", self.down_z, self.feed_rate)
    }
}

/// Tokens that classify device replies.
///
/// Firmware builds differ in casing, so matching is configurable per token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseTokens {
    /// Substring marking an acknowledgment
    pub ack: String,

    /// Match `ack` case-sensitively
    pub ack_case_sensitive: bool,

    /// Substring marking an idle machine
    pub idle: String,

    /// Match `idle` case-sensitively
    pub idle_case_sensitive: bool,
}

impl Default for ResponseTokens {
    fn default() -> Self {
        Self {
            ack: "ok".to_string(),
            ack_case_sensitive: false,
            idle: "Idle".to_string(),
            idle_case_sensitive: true,
        }
    }
}

impl ResponseTokens {
    /// Whether `line` carries the acknowledgment token
    pub fn is_ack(&self, line: &str) -> bool {
        contains_token(line, &self.ack, self.ack_case_sensitive)
    }

    /// Whether `line` carries the idle token
    pub fn is_idle(&self, line: &str) -> bool {
        contains_token(line, &self.idle, self.idle_case_sensitive)
    }
}

fn contains_token(line: &str, token: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        line.contains(token)
    } else {
        line.to_lowercase().contains(&token.to_lowercase())
    }
}

/// Session-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Command that makes the current position the origin
    pub origin_command: String,

    /// Wait after the origin command
    pub origin_settle_ms: u64,

    /// Optional limit on a whole session, in seconds; unlimited by default
    /// since drawing time grows with the program
    pub deadline_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            origin_command: "G92 X0 Y0 Z0".to_string(),
            origin_settle_ms: 500,
            deadline_secs: None,
        }
    }
}

impl SessionConfig {
    pub fn origin_settle(&self) -> Duration {
        Duration::from_millis(self.origin_settle_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Config with every delay collapsed, used by simulations and tests
    pub fn fast() -> Self {
        let mut config = Config::default();
        config.link.open_settle_ms = 0;
        config.link.wake_settle_ms = 0;
        config.link.read_timeout_ms = 50;
        config.dispatch.write_settle_ms = 1;
        config.dispatch.response_window_ms = 100;
        config.dispatch.retry_backoff_ms = 1;
        config.gate.poll_interval_ms = 5;
        config.gate.max_wait_ms = 500;
        config.session.origin_settle_ms = 1;
        config
    }
}
