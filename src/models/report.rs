//! Session Report Model
//!
//! The result of drawing one program, handed back to the game loop. A
//! degraded or aborted report means the pen may not be where the program
//! assumes it is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AbandonReason, CommandOutcome, CommandRecord, Position};
use crate::error::{Error, ErrorKind};

/// Overall session status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Every command executed
    Complete,
    /// All commands reached a terminal outcome, some were abandoned
    Degraded,
    /// The session stopped early on a fatal error
    Aborted { kind: ErrorKind, message: String },
}

/// Per-session report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub id: Uuid,
    pub program: String,
    pub port: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Whether the origin reset was written
    pub origin_set: bool,

    /// One record per command that reached a terminal outcome, in order
    pub records: Vec<CommandRecord>,

    /// Commands in the program, including any never reached
    pub total_commands: usize,

    /// Last position seen in a status report
    pub last_position: Option<Position>,

    pub status: SessionStatus,
}

impl SessionReport {
    /// Start a report for a session
    pub fn new(id: Uuid, program: impl Into<String>, port: impl Into<String>, total: usize) -> Self {
        Self {
            id,
            program: program.into(),
            port: port.into(),
            started_at: Utc::now(),
            finished_at: None,
            origin_set: false,
            records: Vec::new(),
            total_commands: total,
            last_position: None,
            status: SessionStatus::Complete,
        }
    }

    pub fn record(&mut self, record: CommandRecord) {
        self.records.push(record);
    }

    /// Close the report; `abort` carries the fatal error, if any
    pub fn finish(&mut self, abort: Option<&Error>) {
        self.finished_at = Some(Utc::now());
        self.status = match abort {
            Some(err) => SessionStatus::Aborted {
                kind: err.kind(),
                message: err.to_string(),
            },
            None if self.abandoned().next().is_none() => SessionStatus::Complete,
            None => SessionStatus::Degraded,
        };
    }

    pub fn executed_count(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_executed()).count()
    }

    /// Records of abandoned commands with their reasons
    pub fn abandoned(&self) -> impl Iterator<Item = (&CommandRecord, &AbandonReason)> {
        self.records.iter().filter_map(|r| match &r.outcome {
            CommandOutcome::Abandoned(reason) => Some((r, reason)),
            CommandOutcome::Executed { .. } => None,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.status == SessionStatus::Complete
    }

    pub fn is_degraded(&self) -> bool {
        self.status == SessionStatus::Degraded
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.status, SessionStatus::Aborted { .. })
    }

    /// Operator-facing summary, one line per abandoned command
    pub fn summary(&self) -> String {
        let mut out = match &self.status {
            SessionStatus::Complete => format!(
                "Program '{}' complete: {}/{} commands executed",
                self.program,
                self.executed_count(),
                self.total_commands
            ),
            SessionStatus::Degraded => format!(
                "Program '{}' DEGRADED: {}/{} commands executed, plotter position may have drifted",
                self.program,
                self.executed_count(),
                self.total_commands
            ),
            SessionStatus::Aborted { kind, message } => format!(
                "Program '{}' ABORTED [{}]: {} ({}/{} commands executed)",
                self.program,
                kind,
                message,
                self.executed_count(),
                self.total_commands
            ),
        };

        for (record, reason) in self.abandoned() {
            out.push_str(&format!(
                "\n  line {}: '{}' abandoned, {}",
                record.line, record.original, reason
            ));
        }
        out
    }
}
