//! Shared configuration for the couchview query server.
//!
//! Configuration is layered by [`ortho_config`]: built-in defaults, then an
//! optional configuration file, then `COUCHVIEW_*` environment variables, and
//! finally command-line flags. The query server itself speaks only over
//! standard input and output, so the surface is deliberately small: where
//! structured logs go and how they look, plus a ceiling on the size of a
//! single protocol line.
//!
//! ```rust,no_run
//! use couchview_config::{Config, LogFormat};
//!
//! # fn main() -> Result<(), std::sync::Arc<ortho_config::OrthoError>> {
//! let config = Config::load()?;
//! if config.log_format() == LogFormat::Compact {
//!     // Interactive session.
//! }
//! # Ok(())
//! # }
//! ```

mod defaults;
mod logging;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_MAX_LINE_BYTES, default_log_filter, default_log_filter_string,
    default_log_format, default_max_line_bytes,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved configuration for the query server process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "COUCHVIEW")]
pub struct Config {
    /// Filter expression handed to the tracing subscriber.
    #[serde(default = "defaults::default_log_filter_string")]
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Output format of structured diagnostics written to standard error.
    #[serde(default = "defaults::default_log_format")]
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// Largest protocol line, in bytes, the dispatch loop will decode.
    #[serde(default = "defaults::default_max_line_bytes")]
    #[ortho_config(default = defaults::default_max_line_bytes())]
    pub max_line_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl Config {
    /// Filter expression applied to structured logging.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Output format applied to structured logging.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Largest protocol line the dispatch loop accepts.
    #[must_use]
    pub const fn max_line_bytes(&self) -> usize {
        self.max_line_bytes
    }
}
