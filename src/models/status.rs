//! Device Status Model
//!
//! Classification of the reply lines a GRBL-class controller sends back,
//! plus parsing of its `<State|MPos:x,y,z|...>` status reports.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::config::ResponseTokens;

/// A device reply, classified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    /// Machine reports it is idle
    Idle,
    /// Machine reports a non-idle state (`Run`, `Jog`, `Hold:0`, ...)
    Busy(String),
    /// Reply carries the acknowledgment token
    Acknowledged,
    /// Reply that fits none of the above (banners, `error:`, `ALARM:`)
    Unrecognized(String),
    /// Nothing arrived within the read timeout
    Silent,
}

impl DeviceStatus {
    /// Classify one reply line
    pub fn classify(line: &str, tokens: &ResponseTokens) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return DeviceStatus::Silent;
        }

        if let Some(report) = StatusReport::parse(line) {
            return if tokens.is_idle(line) {
                DeviceStatus::Idle
            } else {
                DeviceStatus::Busy(report.state)
            };
        }

        if tokens.is_ack(line) {
            DeviceStatus::Acknowledged
        } else if tokens.is_idle(line) {
            DeviceStatus::Idle
        } else {
            DeviceStatus::Unrecognized(line.to_string())
        }
    }

    /// Whether a command may be sent after this reply
    pub fn is_ready(&self) -> bool {
        matches!(self, DeviceStatus::Idle | DeviceStatus::Acknowledged)
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, DeviceStatus::Busy(_))
    }

    /// Short description for logs and errors
    pub fn describe(&self) -> String {
        match self {
            DeviceStatus::Idle => "Idle".to_string(),
            DeviceStatus::Busy(state) => format!("Busy({})", state),
            DeviceStatus::Acknowledged => "Acknowledged".to_string(),
            DeviceStatus::Unrecognized(line) => format!("Unrecognized({})", line),
            DeviceStatus::Silent => "Silent".to_string(),
        }
    }
}

/// Machine coordinates reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Parsed `<...>` status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// State field, e.g. `Idle`, `Run`, `Hold:0`
    pub state: String,

    /// `MPos` (or `WPos` when that is all the firmware reports)
    pub position: Option<Position>,
}

fn position_regex() -> &'static Regex {
    static POSITION: OnceLock<Regex> = OnceLock::new();
    POSITION.get_or_init(|| {
        Regex::new(r"(?:MPos|WPos):(-?[0-9.]+),(-?[0-9.]+),(-?[0-9.]+)")
            .expect("position pattern is valid")
    })
}

impl StatusReport {
    /// Parse a status report line; `None` if the line is not one
    pub fn parse(line: &str) -> Option<Self> {
        let body = line.trim().strip_prefix('<')?.strip_suffix('>')?;
        let state = body.split('|').next()?.trim();
        if state.is_empty() {
            return None;
        }

        let position = position_regex().captures(body).and_then(|caps| {
            Some(Position {
                x: caps.get(1)?.as_str().parse().ok()?,
                y: caps.get(2)?.as_str().parse().ok()?,
                z: caps.get(3)?.as_str().parse().ok()?,
            })
        });

        Some(Self {
            state: state.to_string(),
            position,
        })
    }
}
