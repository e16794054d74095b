//! Buffer for snippet log lines emitted while a command runs.

use couchview_sandbox::LogSink;
use tracing::debug;

use super::REGISTRY_TARGET;

/// Collects `log(...)` output for one command.
///
/// Every message is also traced at `debug` so operators can follow snippet
/// output without capturing the protocol stream.
#[derive(Debug, Default)]
pub struct SessionLog {
    messages: Vec<String>,
}

impl SessionLog {
    /// Creates an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Messages collected so far.
    #[must_use]
    pub const fn messages(&self) -> &[String] {
        self.messages.as_slice()
    }

    /// Consumes the buffer, yielding its messages in order.
    #[must_use]
    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }
}

impl LogSink for SessionLog {
    fn log(&mut self, message: &str) {
        debug!(target: REGISTRY_TARGET, message, "snippet log");
        self.messages.push(message.to_owned());
    }
}
