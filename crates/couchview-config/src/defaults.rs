use crate::logging::LogFormat;

/// Default log filter expression used by the query server.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default upper bound on a single protocol line, in bytes.
///
/// Design documents with many views routinely exceed a few megabytes, so the
/// limit is generous and exists only to stop a runaway writer from exhausting
/// memory.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024 * 1024;

/// Default log filter expression used by the query server.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the query server.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default upper bound on a single protocol line.
#[must_use]
pub const fn default_max_line_bytes() -> usize {
    DEFAULT_MAX_LINE_BYTES
}
