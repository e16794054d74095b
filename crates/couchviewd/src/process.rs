//! Process entry wiring standard streams to a bootstrapped server.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::bootstrap::{BootstrapError, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::protocol::{ServeError, SessionSummary};

/// Failures that end the process with a non-zero status.
#[derive(Debug, Error)]
pub enum RunError {
    /// The server could not start.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// A standard stream failed mid-session.
    #[error(transparent)]
    Serve(#[from] ServeError),
}

/// Loads configuration, installs telemetry and serves standard input until it
/// closes.
///
/// # Errors
///
/// Returns [`RunError`] when bootstrap fails or a standard stream breaks.
pub fn run() -> Result<SessionSummary, RunError> {
    let reporter: Arc<dyn HealthReporter> = Arc::new(StructuredHealthReporter::new());
    let mut daemon = bootstrap_with(&SystemConfigLoader, reporter)?;
    let summary = daemon.serve(io::stdin().lock(), io::stdout().lock())?;
    Ok(summary)
}
