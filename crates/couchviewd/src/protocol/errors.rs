//! Error types for protocol framing and command parsing.
//!
//! Every variant maps to the error tag the database expects in an
//! `["error", kind, message]` reply, so a failure on one line never stops the
//! loop from reading the next.

use std::io;

use thiserror::Error;

/// Errors raised while turning an input line into a [`Command`].
///
/// [`Command`]: super::command::Command
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The line is not a JSON array.
    #[error("malformed line: {message}")]
    MalformedLine {
        /// Description of the framing problem.
        message: String,
        /// Parser error, when the line was not valid JSON.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// An element of a known command has the wrong type or is missing.
    #[error("malformed {command} command: expected {expected} at position {position}")]
    MalformedCommand {
        /// Name of the command being parsed.
        command: &'static str,
        /// Zero-based position of the offending element.
        position: usize,
        /// Description of what was expected there.
        expected: &'static str,
    },

    /// The command name is not part of the protocol.
    #[error("unknown command: {name}")]
    UnknownCommand {
        /// Name found at position 0.
        name: String,
    },

    /// A `ddoc` path names an operation the server does not implement.
    #[error("unknown design document operation: {operation}")]
    UnknownDesignOperation {
        /// The path, rendered as JSON.
        operation: String,
    },

    /// The line exceeds the configured size limit.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    LineTooLarge {
        /// Bytes read before the newline.
        size: usize,
        /// Configured limit.
        max_size: usize,
    },

    /// A handler panicked; the server state is kept as it was left.
    #[error("internal error: {message}")]
    HandlerPanicked {
        /// Panic payload, when it was a string.
        message: String,
    },
}

impl ProtocolError {
    /// Returns the error tag used on the wire.
    #[must_use]
    pub const fn wire_kind(&self) -> &'static str {
        match self {
            Self::MalformedLine { .. }
            | Self::MalformedCommand { .. }
            | Self::LineTooLarge { .. }
            | Self::HandlerPanicked { .. } => "unnamed_error",
            Self::UnknownCommand { .. } | Self::UnknownDesignOperation { .. } => "unknown_command",
        }
    }

    /// Creates a malformed line error from a serde error.
    #[must_use]
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedLine {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed line error with a custom message.
    #[must_use]
    pub fn malformed_line(message: impl Into<String>) -> Self {
        Self::MalformedLine {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a malformed command error naming the offending position.
    #[must_use]
    pub const fn malformed_command(
        command: &'static str,
        position: usize,
        expected: &'static str,
    ) -> Self {
        Self::MalformedCommand {
            command,
            position,
            expected,
        }
    }

    /// Creates an unknown command error.
    #[must_use]
    pub fn unknown_command(name: impl Into<String>) -> Self {
        Self::UnknownCommand { name: name.into() }
    }

    /// Creates an unknown design operation error.
    #[must_use]
    pub fn unknown_design_operation(operation: impl Into<String>) -> Self {
        Self::UnknownDesignOperation {
            operation: operation.into(),
        }
    }

    /// Creates a line too large error.
    #[must_use]
    pub const fn line_too_large(size: usize, max_size: usize) -> Self {
        Self::LineTooLarge { size, max_size }
    }

    /// Creates a handler panic error.
    #[must_use]
    pub fn handler_panicked(message: impl Into<String>) -> Self {
        Self::HandlerPanicked {
            message: message.into(),
        }
    }
}

/// Errors that end the serve loop.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Reading from the input stream failed.
    #[error("failed to read request: {0}")]
    Read(#[source] io::Error),

    /// Writing to the output stream failed.
    #[error("failed to write response: {0}")]
    Write(#[source] io::Error),

    /// A response could not be encoded.
    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}
