//! Domain errors raised while compiling or invoking snippets.

use std::fmt;

use thiserror::Error;

use crate::kind::FunctionKind;
use crate::syntax::Position;

/// A single problem found in snippet source, with its location when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    message: String,
    position: Option<Position>,
}

impl Diagnostic {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    pub(crate) fn at(message: impl Into<String>, position: Position) -> Self {
        Self {
            message: message.into(),
            position: Some(position),
        }
    }

    /// Description of the problem without location information.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Location of the problem, if it could be attributed to one.
    #[must_use]
    pub const fn position(&self) -> Option<Position> {
        self.position
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(position) => write!(f, "{} at {position}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for Diagnostic {}

/// Errors raised while turning source text into a callable function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The source does not start with one of the recognised declarations.
    #[error(
        "source must declare one of `func Map`, `func Reduce`, `func Update`, `func Filter`, \
         `func Validate` or `func Rewrite`"
    )]
    UnrecognizedFunctionKind,

    /// Parsing or symbol resolution failed.
    #[error("compilation failed: {diagnostic}")]
    Compilation {
        /// The first problem encountered.
        diagnostic: Diagnostic,
    },

    /// The declared kind disagrees with the kind the caller asked for.
    #[error("expected a {expected} function but the source declares {found}")]
    SignatureMismatch {
        /// Kind requested by the caller.
        expected: FunctionKind,
        /// Kind declared by the source.
        found: FunctionKind,
    },
}

impl From<Diagnostic> for CompileError {
    fn from(diagnostic: Diagnostic) -> Self {
        Self::Compilation { diagnostic }
    }
}

/// Errors raised while running a compiled function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    /// The snippet failed while executing.
    #[error("{kind} function failed: {diagnostic}")]
    Runtime {
        /// Kind of the failing function.
        kind: FunctionKind,
        /// What went wrong and where.
        diagnostic: Diagnostic,
    },

    /// The snippet completed but returned a value of the wrong shape.
    #[error("{kind} function returned an invalid result: {message}")]
    InvalidResult {
        /// Kind of the offending function.
        kind: FunctionKind,
        /// Description of the expected shape.
        message: String,
    },

    /// A host record could not be converted into a snippet value.
    #[error("failed to expose {what} to the {kind} function: {message}")]
    HostValue {
        /// Kind of the function being invoked.
        kind: FunctionKind,
        /// Which argument failed to convert.
        what: &'static str,
        /// Serializer error text.
        message: String,
    },
}
