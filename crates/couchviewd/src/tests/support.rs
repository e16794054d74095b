//! Shared state and doubles for the query server test suites.

use std::ffi::OsString;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use ortho_config::{OrthoConfig, OrthoError};
use serde_json::Value as Json;

use couchview_config::Config;

use crate::bootstrap::{BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, bootstrap_with};
use crate::health::HealthReporter;
use crate::protocol::{SessionSummary, serve};
use crate::server::QueryServer;

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    pub server: QueryServer,
    pub max_line_bytes: usize,
    pub replies: Vec<Json>,
    pub summary: Option<SessionSummary>,
    pub reporter: Arc<RecordingHealthReporter>,
    loader: Box<dyn ConfigLoader>,
    daemon: Option<Daemon>,
    bootstrap_error: Option<BootstrapError>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            server: QueryServer::new(),
            max_line_bytes: Config::default().max_line_bytes(),
            replies: Vec::new(),
            summary: None,
            reporter: Arc::new(RecordingHealthReporter::default()),
            loader: Box::new(StaticConfigLoader::new(Config::default())),
            daemon: None,
            bootstrap_error: None,
        }
    }

    /// Sends protocol lines, keeping only the replies they produce.
    pub fn send(&mut self, lines: &[&str]) {
        let mut input = lines.join("\n");
        input.push('\n');
        let mut output = Vec::new();
        let summary = serve(
            Cursor::new(input),
            &mut output,
            &mut self.server,
            self.max_line_bytes,
        )
        .expect("in-memory streams never fail");
        self.summary = Some(summary);
        self.replies = parse_replies(&output);
    }

    /// The last reply, which is always the response.
    pub fn response(&self) -> &Json {
        self.replies.last().expect("no reply recorded")
    }

    /// Log messages that preceded the response.
    pub fn log_messages(&self) -> Vec<String> {
        self.replies
            .iter()
            .filter_map(|reply| match reply.as_array().map(Vec::as_slice) {
                Some([Json::String(tag), Json::String(message)]) if tag == "log" => {
                    Some(message.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn use_failing_loader(&mut self) {
        self.loader = Box::new(FailingConfigLoader);
        self.daemon = None;
        self.bootstrap_error = None;
    }

    pub fn bootstrap(&mut self) {
        match bootstrap_with(&*self.loader, self.reporter.clone()) {
            Ok(daemon) => self.daemon = Some(daemon),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    /// Serves `lines` through the bootstrapped daemon.
    pub fn serve_daemon(&mut self, lines: &[&str]) {
        let daemon = self.daemon.as_mut().expect("daemon not bootstrapped");
        let mut input = lines.join("\n");
        input.push('\n');
        let mut output = Vec::new();
        let summary = daemon
            .serve(Cursor::new(input), &mut output)
            .expect("in-memory streams never fail");
        self.summary = Some(summary);
        self.replies = parse_replies(&output);
    }

    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

pub fn parse_replies(output: &[u8]) -> Vec<Json> {
    String::from_utf8(output.to_vec())
        .expect("replies are UTF-8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("each reply is one JSON value"))
        .collect()
}

/// Removes the quotes `rstest-bdd` keeps around placeholder values.
pub fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value)
}

/// Loader that fails by passing an unknown log format on the command line.
struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("couchviewd"),
            OsString::from("--log-format"),
            OsString::from("xml"),
        ];
        Config::load_from_iter(args)
    }
}

/// Health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    SessionFinished(SessionSummary),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn session_finished(&self, summary: &SessionSummary) {
        self.record(HealthEvent::SessionFinished(*summary));
    }
}
