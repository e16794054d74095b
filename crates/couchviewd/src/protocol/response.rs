//! Response encoding for the query protocol.
//!
//! Each reply is one JSON line. Any number of `["log", message]` lines may
//! precede it; the database reads logs until it sees the response.

use std::io::Write;

use serde::{Serialize, Serializer};
use serde_json::Value as Json;

use couchview_sandbox::EmitAccumulator;

use super::errors::ServeError;

/// The single reply to one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// `true`
    Ok,
    /// `[true, results]`
    Results(Vec<Json>),
    /// One list of emitted pairs per ad hoc map function.
    Mapped(Vec<EmitAccumulator>),
    /// `["up", doc, response]`
    Updated {
        /// Document to save, or `null`.
        document: Json,
        /// HTTP response description.
        response: Json,
    },
    /// `["ok", rewrite]`
    Rewritten(Json),
    /// `1`, the validation pass marker.
    Accepted,
    /// `["error", kind, message]`
    Error {
        /// Protocol error tag.
        kind: &'static str,
        /// Human readable reason.
        message: String,
    },
}

impl Response {
    /// Creates an error response.
    #[must_use]
    pub fn error(kind: &'static str, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    /// Reports whether the response is an error.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Ok => serializer.serialize_bool(true),
            Self::Accepted => serializer.serialize_u8(1),
            Self::Results(results) => (true, results).serialize(serializer),
            Self::Mapped(rows) => rows.serialize(serializer),
            Self::Updated { document, response } => ("up", document, response).serialize(serializer),
            Self::Rewritten(rewrite) => ("ok", rewrite).serialize(serializer),
            Self::Error { kind, message } => ("error", kind, message).serialize(serializer),
        }
    }
}

/// Lines written to the output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `["log", message]`
    Log(String),
    /// The reply to the current command.
    Response(Response),
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Log(message) => ("log", message).serialize(serializer),
            Self::Response(response) => response.serialize(serializer),
        }
    }
}

/// Writer that frames messages as JSON lines.
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Creates a new response writer wrapping the given output stream.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a message as a JSON line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_message(&mut self, message: &Message) -> Result<(), ServeError> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n").map_err(ServeError::Write)
    }

    /// Writes the log lines for a command followed by its response, then
    /// flushes so the database never waits on buffered output.
    ///
    /// # Errors
    ///
    /// Returns an error if writing or flushing fails.
    pub fn write_reply(&mut self, logs: Vec<String>, response: Response) -> Result<(), ServeError> {
        for log in logs {
            self.write_message(&Message::Log(log))?;
        }
        self.write_message(&Message::Response(response))?;
        self.writer.flush().map_err(ServeError::Write)
    }
}
