//! Program Model
//!
//! An ordered, finite list of commands read from one program file, and
//! the player symbols used to name move programs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::Command;

/// Ordered commands of one program file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Name the program was requested by
    pub name: String,

    /// File the commands were read from
    pub path: PathBuf,

    /// Commands in file order
    pub commands: Vec<Command>,
}

impl Program {
    pub fn new(name: impl Into<String>, path: PathBuf, commands: Vec<Command>) -> Self {
        Self {
            name: name.into(),
            path,
            commands,
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.commands.iter()
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Command;
    type IntoIter = std::slice::Iter<'a, Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

/// Player symbol drawn on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    X,
    O,
}

impl Symbol {
    /// Lowercase letter used in program names
    pub fn letter(self) -> char {
        match self {
            Symbol::X => 'x',
            Symbol::O => 'o',
        }
    }

    /// The other player
    pub fn opponent(self) -> Self {
        match self {
            Symbol::X => Symbol::O,
            Symbol::O => Symbol::X,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::X => f.write_str("X"),
            Symbol::O => f.write_str("O"),
        }
    }
}

impl std::str::FromStr for Symbol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "x" | "X" => Ok(Symbol::X),
            "o" | "O" => Ok(Symbol::O),
            other => Err(format!("unknown symbol '{}', expected X or O", other)),
        }
    }
}
