//! Routes `tracing` events to standard error.
//!
//! Standard output carries the protocol, so the subscriber installed here
//! never writes anywhere else. Installation happens once per process.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use couchview_config::{Config, LogFormat};

static INSTALLED_FORMAT: OnceCell<LogFormat> = OnceCell::new();

/// Proof that diagnostics are wired up, carrying the format actually in use.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Format of the subscriber that owns standard error.
    ///
    /// This is the format from the first successful [`initialise`] call,
    /// whatever later configurations asked for.
    #[must_use]
    pub const fn format(self) -> LogFormat {
        self.format
    }
}

/// Why diagnostics could not be wired up.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// `log_filter` is not a valid `EnvFilter` directive list.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Something other than this module already owns the global subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Sends diagnostics to standard error using the configured filter and format.
///
/// Only the first successful call installs anything. Every later call hands
/// back a handle describing that first subscriber.
///
/// ```rust
/// use couchview_config::Config;
/// use couchviewd::telemetry;
///
/// # fn main() -> Result<(), couchviewd::telemetry::TelemetryError> {
/// let config = Config::default();
/// let first = telemetry::initialise(&config)?;
/// let second = telemetry::initialise(&config)?;
/// assert_eq!(first.format(), second.format());
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Fails, leaving nothing installed, if the filter does not parse or a
/// foreign subscriber got there first.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED_FORMAT
        .get_or_try_init(|| install_subscriber(config))
        .map(|format| TelemetryHandle { format: *format })
}

fn install_subscriber(config: &Config) -> Result<LogFormat, TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let builder = |env_filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_level(true)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;
    Ok(config.log_format())
}
