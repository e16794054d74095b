//! Line loop that reads commands, dispatches them and writes replies.
//!
//! The loop owns no state of its own: it frames input lines, turns each into
//! a [`Command`], hands it to the [`QueryServer`] and writes the collected log
//! lines followed by exactly one response. Protocol errors, handler errors and
//! handler panics all become `["error", ...]` replies so the next line is
//! always read. Only a read or write failure on the streams ends the loop.

use std::any::Any;
use std::io::{self, BufRead, Write};
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, warn};

use crate::server::{QueryServer, SessionLog};

use super::command::{Command, CommandKind};
use super::errors::{ProtocolError, ServeError};
use super::response::{Response, ResponseWriter};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Counters reported when the input stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Non-blank lines handled.
    pub commands: usize,
    /// Replies that were `["error", ...]`.
    pub errors: usize,
}

/// Serves commands from `input` until it is exhausted.
///
/// Lines longer than `max_line_bytes` are answered with an `unnamed_error`
/// and skipped without being buffered.
///
/// # Errors
///
/// Returns [`ServeError`] when reading the input or writing a reply fails.
pub fn serve<R: BufRead, W: Write>(
    input: R,
    output: W,
    server: &mut QueryServer,
    max_line_bytes: usize,
) -> Result<SessionSummary, ServeError> {
    let mut reader = LineReader::new(input, max_line_bytes);
    let mut writer = ResponseWriter::new(output);
    let mut summary = SessionSummary::default();

    loop {
        let (logs, response) = match reader.next_line().map_err(ServeError::Read)? {
            LineRead::Eof => break,
            LineRead::TooLarge(size) => {
                let error = ProtocolError::line_too_large(size, max_line_bytes);
                warn!(target: DISPATCH_TARGET, %error, "rejected oversize line");
                (Vec::new(), Response::error(error.wire_kind(), error.to_string()))
            }
            LineRead::Line(line) if is_blank(&line) => continue,
            LineRead::Line(line) => {
                let mut logs = SessionLog::new();
                let response = dispatch(server, &line, &mut logs);
                (logs.into_messages(), response)
            }
        };
        summary.commands = summary.commands.saturating_add(1);
        if response.is_error() {
            summary.errors = summary.errors.saturating_add(1);
        }
        writer.write_reply(logs, response)?;
    }

    debug!(
        target: DISPATCH_TARGET,
        commands = summary.commands,
        errors = summary.errors,
        "input exhausted"
    );
    Ok(summary)
}

fn dispatch(server: &mut QueryServer, line: &[u8], logs: &mut SessionLog) -> Response {
    let (kind, command) = match parse_line(line) {
        Ok(parsed) => parsed,
        Err(error) => {
            warn!(target: DISPATCH_TARGET, %error, "rejected command");
            return Response::error(error.wire_kind(), error.to_string());
        }
    };
    debug!(target: DISPATCH_TARGET, command = kind.as_str(), "dispatching command");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        server.execute(command, line.len(), logs)
    }));
    match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(failure)) => {
            debug!(
                target: DISPATCH_TARGET,
                command = kind.as_str(),
                kind = failure.wire_kind(),
                error = %failure,
                "command failed"
            );
            Response::error(failure.wire_kind(), failure.wire_message())
        }
        Err(payload) => {
            let failure = ProtocolError::handler_panicked(panic_message(payload.as_ref()));
            error!(
                target: DISPATCH_TARGET,
                command = kind.as_str(),
                error = %failure,
                "handler panicked"
            );
            Response::error(failure.wire_kind(), failure.to_string())
        }
    }
}

fn parse_line(line: &[u8]) -> Result<(CommandKind, Command), ProtocolError> {
    let items = Command::decode_line(line)?;
    let kind = CommandKind::classify(&items)?;
    Ok((kind, Command::parse(kind, &items)?))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_owned())
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

/// Result of reading one framed line.
#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    Line(Vec<u8>),
    /// The line exceeded the limit; carries the bytes seen before the newline.
    TooLarge(usize),
    Eof,
}

/// Reads newline-delimited lines without buffering past the limit.
struct LineReader<R> {
    input: R,
    max_line_bytes: usize,
}

impl<R: BufRead> LineReader<R> {
    const fn new(input: R, max_line_bytes: usize) -> Self {
        Self {
            input,
            max_line_bytes,
        }
    }

    fn next_line(&mut self) -> io::Result<LineRead> {
        let mut line = Vec::new();
        let mut size = 0_usize;
        let mut seen_any = false;

        loop {
            let available = match self.input.fill_buf() {
                Ok(bytes) => bytes,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(error),
            };
            if available.is_empty() {
                return Ok(self.finish(line, size, seen_any));
            }
            seen_any = true;

            let newline = available.iter().position(|byte| *byte == b'\n');
            let (chunk, consumed) = match newline {
                Some(position) => (available.split_at(position).0, position.saturating_add(1)),
                None => (available, available.len()),
            };
            size = size.saturating_add(chunk.len());
            if size > self.max_line_bytes {
                line.clear();
            } else {
                line.extend_from_slice(chunk);
            }
            self.input.consume(consumed);

            if newline.is_some() {
                return Ok(self.finish(line, size, true));
            }
        }
    }

    fn finish(&self, line: Vec<u8>, size: usize, seen_any: bool) -> LineRead {
        if !seen_any {
            LineRead::Eof
        } else if size > self.max_line_bytes {
            LineRead::TooLarge(size)
        } else {
            LineRead::Line(line)
        }
    }
}
