//! Program Loader
//!
//! Resolves program names to files under the configured directory and
//! reads them into ordered [`Program`]s. Loading happens before a link is
//! opened, so a missing program never touches the device.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ProgramConfig;
use crate::error::{Error, Result};
use crate::models::{Command, Program, Symbol};

/// Loads motion programs from a directory
#[derive(Debug, Clone)]
pub struct ProgramLoader {
    directory: PathBuf,
    extension: String,
}

impl ProgramLoader {
    pub fn new(config: &ProgramConfig) -> Self {
        Self {
            directory: config.directory.clone(),
            extension: config.extension.clone(),
        }
    }

    /// Loader rooted at `directory` with the default extension
    pub fn in_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            extension: ProgramConfig::default().extension,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path a program name resolves to; the extension is optional
    pub fn resolve(&self, name: &str) -> PathBuf {
        let path = self.directory.join(name);
        if path.extension().is_some() || self.extension.is_empty() {
            path
        } else {
            path.with_extension(&self.extension)
        }
    }

    /// Load a program by name
    ///
    /// # Errors
    /// `ProgramNotFound` if the file does not exist, `Io` if it cannot be read
    pub fn load(&self, name: &str) -> Result<Program> {
        let path = self.resolve(name);
        if !path.is_file() {
            return Err(Error::ProgramNotFound {
                name: name.to_string(),
                path,
            });
        }

        let content = fs::read_to_string(&path)?;
        let commands = parse_program(&content);
        debug!(
            "Loaded program '{}' from {} ({} commands)",
            name,
            path.display(),
            commands.len()
        );
        Ok(Program::new(name, path, commands))
    }

    /// Names of the programs in the directory, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let matches_extension = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == self.extension);
            if matches_extension {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Split program text into commands, dropping blank lines
pub fn parse_program(content: &str) -> Vec<Command> {
    content
        .lines()
        .enumerate()
        .filter_map(|(index, raw)| {
            let text = raw.trim();
            (!text.is_empty()).then(|| Command::new(index + 1, text))
        })
        .collect()
}

/// Program that draws `symbol` in the cell at `row`, `col` (0-based)
///
/// Cells are numbered 1 to 9 row by row, e.g. `draw_x_5.gcode` is the
/// centre.
pub fn move_program_name(symbol: Symbol, row: usize, col: usize) -> Result<String> {
    if row > 2 || col > 2 {
        return Err(Error::Other(format!(
            "cell ({}, {}) is outside the 3x3 board",
            row, col
        )));
    }
    let cell = row * 3 + col + 1;
    Ok(format!("draw_{}_{}.gcode", symbol.letter(), cell))
}
