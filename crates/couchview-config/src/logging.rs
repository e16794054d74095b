//! Diagnostic output formats.
//!
//! Standard output belongs to the view protocol, so whichever format is
//! chosen only shapes what lands on standard error.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Rendering used for every diagnostic event the query server emits.
///
/// Parsing ignores ASCII case, so `--log-format JSON` and
/// `COUCHVIEW_LOG_FORMAT=compact` are both accepted.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One flattened JSON object per event, for the database host to collect.
    #[default]
    Json,
    /// Terse text lines for someone watching a terminal.
    Compact,
}

/// Returned when a format name is neither `json` nor `compact`.
pub type LogFormatParseError = strum::ParseError;
