//! Command Model
//!
//! A single line of the device's instruction language, tagged with the
//! line of the program file it came from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One motion command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// 1-based line number in the source program (0 for synthetic commands)
    pub line: usize,

    /// Command text without the line terminator
    pub text: String,
}

impl Command {
    /// Create a command read from `line` of a program
    pub fn new(line: usize, text: impl Into<String>) -> Self {
        Self {
            line,
            text: text.into(),
        }
    }

    /// Create a command that did not come from a program file
    pub fn synthetic(text: impl Into<String>) -> Self {
        Self::new(0, text)
    }

    /// Same source line, different text
    pub fn rewritten(&self, text: impl Into<String>) -> Self {
        Self::new(self.line, text)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
