//! Command Transformer
//!
//! Rewrites generic program commands into what this particular plotter
//! accepts. Rules are checked in order and the first match wins:
//!
//! 1. Dwell (`G4 P<seconds>`): duration rounded to two decimals, since the
//!    firmware parser rejects long float literals.
//! 2. Combined Z move (`G1Z<z> F<feed>`): replaced by the calibrated pen-up
//!    stroke when `z < 0`, otherwise by the pen-down stroke.
//! 3. Anything else passes through untouched.
//!
//! The transformer is pure; the same input always gives the same output.

use thiserror::Error;

use crate::config::PenConfig;
use crate::models::Command;

const DWELL_PREFIX: &str = "G4 P";
const PEN_MOVE_PREFIX: &str = "G1Z";

/// Why a single command could not be rewritten
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("invalid dwell duration '{field}'")]
    InvalidDwell { field: String },

    #[error("invalid Z value '{field}'")]
    InvalidZ { field: String },
}

/// Which rule applies to a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformRule {
    Dwell,
    PenStroke,
    PassThrough,
}

impl TransformRule {
    /// Pick the first rule matching `text`
    pub fn for_command(text: &str) -> Self {
        if text.starts_with(DWELL_PREFIX) {
            TransformRule::Dwell
        } else if text.starts_with(PEN_MOVE_PREFIX) {
            TransformRule::PenStroke
        } else {
            TransformRule::PassThrough
        }
    }
}

/// Stateless command rewriter holding the pen calibration
#[derive(Debug, Clone)]
pub struct Transformer {
    up_stroke: String,
    down_stroke: String,
}

impl Transformer {
    pub fn new(pen: &PenConfig) -> Self {
        Self {
            up_stroke: pen.up_stroke(),
            down_stroke: pen.down_stroke(),
        }
    }

    /// Rewrite one command
    pub fn transform(&self, command: &Command) -> Result<Command, TransformError> {
        let text = command.as_str();
        match TransformRule::for_command(text) {
            TransformRule::Dwell => {
                let field = &text[DWELL_PREFIX.len()..];
                let seconds = parse_finite(field).ok_or_else(|| TransformError::InvalidDwell {
                    field: field.trim().to_string(),
                })?;
                Ok(command.rewritten(format!("{}{:?}", DWELL_PREFIX, round_hundredths(seconds))))
            }
            TransformRule::PenStroke => {
                let field = text[PEN_MOVE_PREFIX.len()..]
                    .split(' ')
                    .next()
                    .unwrap_or_default();
                let z = parse_finite(field).ok_or_else(|| TransformError::InvalidZ {
                    field: field.to_string(),
                })?;
                let stroke = if z < 0.0 {
                    &self.up_stroke
                } else {
                    &self.down_stroke
                };
                Ok(command.rewritten(stroke.as_str()))
            }
            TransformRule::PassThrough => Ok(command.clone()),
        }
    }

    pub fn up_stroke(&self) -> &str {
        &self.up_stroke
    }

    pub fn down_stroke(&self) -> &str {
        &self.down_stroke
    }
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new(&PenConfig::default())
    }
}

fn parse_finite(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Round to two decimals using the exact decimal value of `value`
pub fn round_hundredths(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}
