//! Errors raised by registry handlers.

use couchview_sandbox::InvocationError;
use thiserror::Error;

/// Failures a handler reports back to the database as `["error", ...]`.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// `add_fun` received a source that is not a usable map or reduce.
    #[error("{message}")]
    InvalidFunction {
        /// Compiler diagnostic or kind complaint.
        message: String,
    },

    /// A design document or one of its functions is not registered.
    #[error("{what} not found")]
    NotFound {
        /// Description of the missing item.
        what: String,
    },

    /// A snippet failed or returned an unusable value.
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    /// A validate function returned `Forbidden(message)`.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A validate function returned `Unauthorized(message)`.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A validate function returned something other than a failure or null.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// `reduce_limit` is on and the reduce output did not shrink.
    #[error(
        "reduce output must shrink more rapidly: {output_bytes} bytes of output for \
         {input_bytes} bytes of input"
    )]
    ReduceOverflow {
        /// Size of the encoded reduce results.
        output_bytes: usize,
        /// Size of the input line.
        input_bytes: usize,
    },
}

impl HandlerError {
    /// Creates an invalid function error.
    #[must_use]
    pub fn invalid_function(message: impl Into<String>) -> Self {
        Self::InvalidFunction {
            message: message.into(),
        }
    }

    /// Creates a lookup error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Returns the error tag used on the wire.
    #[must_use]
    pub const fn wire_kind(&self) -> &'static str {
        match self {
            Self::InvalidFunction { .. } => "invalid_function",
            Self::NotFound { .. } => "not_found",
            Self::Invocation(InvocationError::InvalidResult { .. }) => "invalid_result",
            Self::Invocation(_) => "runtime_error",
            Self::Forbidden(_) => "forbidden",
            Self::Unauthorized(_) => "unauthorized",
            Self::ValidationFailed(_) => "validation_failed",
            Self::ReduceOverflow { .. } => "reduce_overflow_error",
        }
    }

    /// Returns the message sent on the wire.
    ///
    /// Validation failures carry the snippet's own message unchanged.
    #[must_use]
    pub fn wire_message(&self) -> String {
        match self {
            Self::Forbidden(message)
            | Self::Unauthorized(message)
            | Self::ValidationFailed(message) => message.clone(),
            other => other.to_string(),
        }
    }
}
