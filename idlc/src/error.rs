//! Diagnostics and the process-level error type.
//!
//! Diagnostics (spec.md §7) are data accumulated by a [`Reporter`], not
//! control flow: a stage that hits one keeps going so the driver can print
//! every problem in a single pass. [`IdlcError`] is the much smaller set of
//! failures that abort the pipeline outright.

use crate::span::Location;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

/// The closed diagnostic-code taxonomy from spec.md §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCode {
    UnexpectedEof,
    UnexpectedToken,
    InvalidLiteral,
    UnsupportedFileFormat,
    MissingModuleUid,
    InvalidAnnotation,
    UnresolvedReference,
    AmbiguousReference,
    Shadowing,
    TypeMismatch,
    KindMismatch,
    WrongArity,
    UnsupportedValue,
    InternalInvariantViolation,
}

impl DiagnosticCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnexpectedEof => "UnexpectedEOF",
            Self::UnexpectedToken => "UnexpectedToken",
            Self::InvalidLiteral => "InvalidLiteral",
            Self::UnsupportedFileFormat => "UnsupportedFileFormat",
            Self::MissingModuleUid => "MissingModuleUID",
            Self::InvalidAnnotation => "InvalidAnnotation",
            Self::UnresolvedReference => "UnresolvedReference",
            Self::AmbiguousReference => "AmbiguousReference",
            Self::Shadowing => "Shadowing",
            Self::TypeMismatch => "TypeMismatch",
            Self::KindMismatch => "KindMismatch",
            Self::WrongArity => "WrongArity",
            Self::UnsupportedValue => "UnsupportedValue",
            Self::InternalInvariantViolation => "InternalInvariantViolation",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported problem: a stable code, a source location, and a message.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub location: Location,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: error[{}]: {}",
            self.location, self.code, self.message
        )
    }
}

/// Accumulates diagnostics across a pipeline stage. Shared via `&Reporter`
/// (interior mutability) so every stage can report without threading a
/// `&mut` through every call.
#[derive(Debug, Default)]
pub struct Reporter {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_with(diagnostics: Vec<Diagnostic>) -> Self {
        Self { diagnostics: Mutex::new(diagnostics) }
    }

    pub fn report(&self, code: DiagnosticCode, location: Location, message: impl Into<String>) {
        self.diagnostics.lock().unwrap().push(Diagnostic {
            code,
            location,
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Diagnostics sorted by URI, then line, then column, for reproducible
    /// output (spec.md §7 leaves cross-file ordering unspecified; we make
    /// same-file ordering deterministic as an allowed usability addition).
    pub fn sorted(&self) -> Vec<Diagnostic> {
        let mut all = self.diagnostics.lock().unwrap().clone();
        all.sort_by(|a, b| {
            (
                &a.location.uri,
                a.location.span.start.line,
                a.location.span.start.column,
            )
                .cmp(&(
                    &b.location.uri,
                    b.location.span.start.line,
                    b.location.span.start.column,
                ))
        });
        all
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics.into_inner().unwrap()
    }

    pub fn extend(&self, other: Reporter) {
        self.diagnostics
            .lock()
            .unwrap()
            .extend(other.into_diagnostics());
    }
}

/// Process-level failures. Distinct from [`Diagnostic`]: these abort the
/// pipeline instead of being collected alongside everything else.
#[derive(Error, Debug)]
pub enum IdlcError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("plugin `{name}` failed: {message}")]
    PluginFailed { name: String, message: String },

    #[error("failed to spawn plugin `{name}`")]
    PluginSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("compilation failed with {0} diagnostic(s)")]
    Diagnostics(Vec<Diagnostic>),

    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),

    #[error("descriptor encode error")]
    Encode(#[from] prost::EncodeError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IdlcError {
    pub fn from_reporter(reporter: Reporter) -> Option<Self> {
        if reporter.is_empty() {
            None
        } else {
            Some(Self::Diagnostics(reporter.into_diagnostics()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{Position, Span};

    fn loc() -> Location {
        Location::new("m.idl", Span::point(Position::new(3, 5, 10)))
    }

    #[test]
    fn reporter_accumulates_and_sorts() {
        let r = Reporter::new();
        r.report(DiagnosticCode::UnresolvedReference, loc(), "x");
        r.report(
            DiagnosticCode::TypeMismatch,
            Location::new("a.idl", Span::point(Position::new(1, 1, 0))),
            "y",
        );
        assert_eq!(r.len(), 2);
        let sorted = r.sorted();
        assert_eq!(sorted[0].location.uri, "a.idl");
    }

    #[test]
    fn empty_reporter_yields_no_error() {
        let r = Reporter::new();
        assert!(IdlcError::from_reporter(r).is_none());
    }
}
