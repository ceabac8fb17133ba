//! Diagnostic records shared by the lexer, parser, and downstream passes.
//!
//! Every diagnostic carries an optional source location with `{file, line,
//! column, offset}` so host tooling can anchor squiggles without re-lexing.
//! Diagnostics are plain serializable records: they cross the host boundary
//! as part of load results and must never hold borrowed source text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position inside a source file. `line` and `column` are 1-based,
/// `offset` is the byte offset from the start of the (BOM-stripped) input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SourceLoc {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl SourceLoc {
    pub fn new(line: u32, column: u32, offset: u32) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A single diagnostic message. Non-fatal diagnostics accumulate in load
/// results; fatal ones are wrapped in the stage error types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLoc>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            file: None,
            loc: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            file: None,
            loc: None,
        }
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Note,
            message: message.into(),
            file: None,
            loc: None,
        }
    }

    pub fn with_loc(mut self, loc: SourceLoc) -> Self {
        self.loc = Some(loc);
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, &self.loc) {
            (Some(file), Some(loc)) => {
                write!(f, "{}: {}:{}: {}", self.severity, file, loc, self.message)
            }
            (None, Some(loc)) => write!(f, "{}: {}: {}", self.severity, loc, self.message),
            (Some(file), None) => write!(f, "{}: {}: {}", self.severity, file, self.message),
            (None, None) => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_location() {
        let d = Diagnostic::error("unexpected token")
            .with_file("door.lsl")
            .with_loc(SourceLoc::new(3, 14, 52));
        assert_eq!(format!("{d}"), "error: door.lsl: 3:14: unexpected token");
    }

    #[test]
    fn severity_predicates() {
        assert!(Diagnostic::error("x").is_error());
        assert!(!Diagnostic::warning("x").is_error());
        assert!(!Diagnostic::note("x").is_error());
    }
}
