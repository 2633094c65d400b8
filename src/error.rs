//! Error types and Result aliases for tictacplot

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transform::TransformError;

/// Result type alias for tictacplot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tictacplot
#[derive(Debug)]
pub enum Error {
    // === Link errors ===
    /// Serial port could not be opened (busy, absent, bad settings)
    ConnectionFailed {
        port: String,
        reason: String,
    },

    /// The link went away in the middle of a session
    Disconnected {
        reason: String,
    },

    /// Another session already owns the port
    PortInUse {
        port: String,
    },

    // === Program errors ===
    /// Named program does not exist under the program directory
    ProgramNotFound {
        name: String,
        path: PathBuf,
    },

    // === Per-command errors ===
    /// A command could not be rewritten for the device
    TransformFailed {
        command: String,
        source: TransformError,
    },

    /// No acknowledgment after every attempt was spent
    AckTimeout {
        command: String,
        attempts: u32,
    },

    /// Device never reported a ready state within the gate's budget
    DeviceNotReady {
        waited: Duration,
        last_status: String,
    },

    // === Session errors ===
    /// Whole-session deadline elapsed
    SessionDeadlineExceeded {
        deadline: Duration,
    },

    /// Session was cancelled by its owner
    Cancelled,

    // === Configuration errors ===
    /// Configuration file not found
    ConfigNotFound,

    /// Failed to load configuration file
    ConfigLoadFailed {
        path: PathBuf,
        reason: String,
    },

    /// Failed to parse configuration
    ConfigParseFailed {
        format: String,
        reason: String,
    },

    /// Failed to serialize configuration
    ConfigSerializationFailed {
        format: String,
        reason: String,
    },

    /// Configuration validation failed
    ConfigValidationFailed {
        field: String,
        reason: String,
    },

    // === I/O errors ===
    /// I/O errors
    Io(std::io::Error),

    // === Generic fallback (use sparingly) ===
    /// Generic errors (for cases not yet categorized)
    Other(String),
}

/// Coarse error label shown to operators and stored in aborted reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Connection,
    Disconnected,
    PortInUse,
    NotFound,
    Transform,
    AckTimeout,
    NotReady,
    Deadline,
    Cancelled,
    Config,
    Io,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Connection => "ConnectionError",
            ErrorKind::Disconnected => "Disconnected",
            ErrorKind::PortInUse => "PortInUse",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Transform => "TransformError",
            ErrorKind::AckTimeout => "AckTimeout",
            ErrorKind::NotReady => "DeviceNotReady",
            ErrorKind::Deadline => "SessionDeadline",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Io => "IoError",
            ErrorKind::Other => "Error",
        };
        f.write_str(label)
    }
}

impl Error {
    /// Kind label for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConnectionFailed { .. } => ErrorKind::Connection,
            Error::Disconnected { .. } => ErrorKind::Disconnected,
            Error::PortInUse { .. } => ErrorKind::PortInUse,
            Error::ProgramNotFound { .. } => ErrorKind::NotFound,
            Error::TransformFailed { .. } => ErrorKind::Transform,
            Error::AckTimeout { .. } => ErrorKind::AckTimeout,
            Error::DeviceNotReady { .. } => ErrorKind::NotReady,
            Error::SessionDeadlineExceeded { .. } => ErrorKind::Deadline,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::ConfigNotFound
            | Error::ConfigLoadFailed { .. }
            | Error::ConfigParseFailed { .. }
            | Error::ConfigSerializationFailed { .. }
            | Error::ConfigValidationFailed { .. } => ErrorKind::Config,
            Error::Io(_) => ErrorKind::Io,
            Error::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether this error ends the session rather than a single command
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::TransformFailed { .. } | Error::AckTimeout { .. } | Error::DeviceNotReady { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Link errors
            Error::ConnectionFailed { port, reason } => {
                write!(f, "Failed to open serial port '{}': {}", port, reason)
            }
            Error::Disconnected { reason } => {
                write!(f, "Device link lost: {}", reason)
            }
            Error::PortInUse { port } => {
                write!(f, "Port '{}' is already driven by another session", port)
            }

            // Program errors
            Error::ProgramNotFound { name, path } => {
                write!(f, "Program '{}' not found at '{}'", name, path.display())
            }

            // Per-command errors
            Error::TransformFailed { command, source } => {
                write!(f, "Cannot transform '{}': {}", command, source)
            }
            Error::AckTimeout { command, attempts } => {
                write!(
                    f,
                    "No acknowledgment for '{}' after {} attempts",
                    command, attempts
                )
            }
            Error::DeviceNotReady { waited, last_status } => {
                write!(
                    f,
                    "Device not ready after {:?} (last status: '{}')",
                    waited, last_status
                )
            }

            // Session errors
            Error::SessionDeadlineExceeded { deadline } => {
                write!(f, "Session exceeded its deadline of {:?}", deadline)
            }
            Error::Cancelled => write!(f, "Session cancelled"),

            // Configuration errors
            Error::ConfigNotFound => write!(f, "Configuration file not found"),
            Error::ConfigLoadFailed { path, reason } => {
                write!(f, "Failed to load config from '{}': {}", path.display(), reason)
            }
            Error::ConfigParseFailed { format, reason } => {
                write!(f, "Failed to parse {} config: {}", format, reason)
            }
            Error::ConfigSerializationFailed { format, reason } => {
                write!(f, "Failed to serialize config as {}: {}", format, reason)
            }
            Error::ConfigValidationFailed { field, reason } => {
                write!(f, "Configuration validation failed for '{}': {}", field, reason)
            }

            Error::Io(err) => write!(f, "I/O error: {}", err),

            // Generic fallback
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::TransformFailed { source, .. } => Some(source),
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::Other(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::Other(err.to_string())
    }
}
