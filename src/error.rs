//! Compile errors and diagnostic rendering.
//!
//! Every error carries the [`Location`] of the construct that caused it and is
//! fatal: compilation stops at the first one.

use crate::ast::Location;
use std::fmt;

pub type Result<T, E = CompileError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("{loc}: syntax error: {message}")]
    Syntax { loc: Location, message: String },

    #[error("{loc}: undeclared {kind} `{name}`")]
    Undeclared {
        loc: Location,
        kind: &'static str,
        name: String,
    },

    #[error("{loc}: `{name}` is declared as {found}, expected {expected}")]
    KindMismatch {
        loc: Location,
        name: String,
        found: &'static str,
        expected: &'static str,
    },

    #[error("{loc}: redeclaration of `{name}` (first declared at {first})")]
    Redeclared {
        loc: Location,
        name: String,
        first: Location,
    },

    #[error("{loc}: integer literal `{literal}` does not fit in 64 bits")]
    IntegerOverflow { loc: Location, literal: String },

    #[error("{loc}: invalid width {width}: {reason}")]
    InvalidWidth {
        loc: Location,
        width: u64,
        reason: &'static str,
    },

    #[error("{loc}: value {value} does not fit in {width} bits")]
    ValueOutOfRange { loc: Location, value: u64, width: u32 },

    #[error("{loc}: duplicate value {value} in enum `{enum_id}` (`{tag}` and `{previous}`)")]
    DuplicateEnumValue {
        loc: Location,
        enum_id: String,
        value: u64,
        tag: String,
        previous: String,
    },

    #[error("{loc}: duplicate enumerator `{tag}` in enum `{enum_id}`")]
    DuplicateEnumTag {
        loc: Location,
        enum_id: String,
        tag: String,
    },

    #[error("{loc}: enum `{enum_id}` has no enumerator `{tag}`")]
    UndeclaredTag {
        loc: Location,
        enum_id: String,
        tag: String,
    },

    #[error("{loc}: group `{group_id}` has no member `{member}`")]
    UnknownMember {
        loc: Location,
        group_id: String,
        member: String,
    },

    #[error("{loc}: no ancestor of `{record}` declares a field `{field}`")]
    UnknownConstraintField {
        loc: Location,
        record: String,
        field: String,
    },

    #[error("{loc}: field `{field}` is constrained more than once")]
    DuplicateConstraint { loc: Location, field: String },

    #[error("{loc}: invalid constraint on `{field}`: {reason}")]
    InvalidConstraint {
        loc: Location,
        field: String,
        reason: String,
    },

    #[error("{loc}: duplicate field `{field}` in `{record}`")]
    DuplicateField {
        loc: Location,
        record: String,
        field: String,
    },

    #[error("{loc}: `{record}` declares more than one body or payload field")]
    DuplicatePayload { loc: Location, record: String },

    #[error("{loc}: `{record}` inherits from `{parent}`, which has no body or payload field")]
    MissingPayload {
        loc: Location,
        record: String,
        parent: String,
    },

    #[error("{loc}: {kind} field in `{record}` refers to unknown field `{target}`")]
    UnresolvedReference {
        loc: Location,
        record: String,
        kind: &'static str,
        target: String,
    },

    #[error("{loc}: {message}")]
    InvalidField { loc: Location, message: String },
}

impl CompileError {
    /// Location of the construct that caused the error.
    pub fn location(&self) -> Location {
        match self {
            CompileError::Syntax { loc, .. }
            | CompileError::Undeclared { loc, .. }
            | CompileError::KindMismatch { loc, .. }
            | CompileError::Redeclared { loc, .. }
            | CompileError::IntegerOverflow { loc, .. }
            | CompileError::InvalidWidth { loc, .. }
            | CompileError::ValueOutOfRange { loc, .. }
            | CompileError::DuplicateEnumValue { loc, .. }
            | CompileError::DuplicateEnumTag { loc, .. }
            | CompileError::UndeclaredTag { loc, .. }
            | CompileError::UnknownMember { loc, .. }
            | CompileError::UnknownConstraintField { loc, .. }
            | CompileError::DuplicateConstraint { loc, .. }
            | CompileError::InvalidConstraint { loc, .. }
            | CompileError::DuplicateField { loc, .. }
            | CompileError::DuplicatePayload { loc, .. }
            | CompileError::MissingPayload { loc, .. }
            | CompileError::UnresolvedReference { loc, .. }
            | CompileError::InvalidField { loc, .. } => *loc,
        }
    }

    pub(crate) fn invalid_field(loc: Location, message: impl Into<String>) -> Self {
        CompileError::InvalidField {
            loc,
            message: message.into(),
        }
    }
}

/// A compile error bound to the file it came from, for display.
///
/// `Display` gives the one-line `path:line:col: message` form;
/// [`Diagnostic::render`] adds the offending source line and a caret.
pub struct Diagnostic<'a> {
    pub path: &'a str,
    pub error: &'a CompileError,
}

impl<'a> Diagnostic<'a> {
    pub fn new(path: &'a str, error: &'a CompileError) -> Self {
        Diagnostic { path, error }
    }

    pub fn render(&self, source: &str) -> String {
        let loc = self.error.location();
        let mut out = self.to_string();
        if let Some(line) = source.lines().nth(loc.line.saturating_sub(1)) {
            let gutter = loc.line.to_string();
            let pad = " ".repeat(gutter.len());
            let caret = " ".repeat(loc.column.saturating_sub(1));
            out.push_str(&format!("\n{pad} |\n{gutter} | {line}\n{pad} | {caret}^"));
        }
        out
    }
}

impl fmt::Display for Diagnostic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn undeclared() -> CompileError {
        CompileError::Undeclared {
            loc: Location { line: 2, column: 12 },
            kind: "type",
            name: "Missing".to_string(),
        }
    }

    #[test]
    fn message_starts_with_location() {
        assert_eq!(undeclared().to_string(), "2:12: undeclared type `Missing`");
    }

    #[test]
    fn render_points_at_column() {
        let src = "little_endian_packets\npacket P { m : Missing }\n";
        let err = undeclared();
        let text = Diagnostic::new("p.pdl", &err).render(src);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "p.pdl:2:12: undeclared type `Missing`");
        assert_eq!(lines[2], "2 | packet P { m : Missing }");
        assert_eq!(lines[1], "  |");
        assert_eq!(lines[3], format!("  | {}^", " ".repeat(11)));
    }

    #[test]
    fn render_without_source_line_is_single_line() {
        let err = undeclared();
        let text = Diagnostic::new("p.pdl", &err).render("");
        assert_eq!(text.lines().count(), 1);
    }
}
