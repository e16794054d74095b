//! Unit coverage for log format parsing and defaults.

use rstest::rstest;

use couchview_config::{Config, DEFAULT_LOG_FILTER, LogFormat};

#[rstest]
#[case("json", LogFormat::Json)]
#[case("JSON", LogFormat::Json)]
#[case("compact", LogFormat::Compact)]
#[case("Compact", LogFormat::Compact)]
fn log_format_parses_case_insensitively(#[case] text: &str, #[case] expected: LogFormat) {
    let parsed = text.parse::<LogFormat>().expect("log format should parse");
    assert_eq!(parsed, expected);
}

#[test]
fn unknown_log_format_is_rejected() {
    assert!("pretty".parse::<LogFormat>().is_err());
}

#[test]
fn log_format_displays_in_snake_case() {
    assert_eq!(LogFormat::Compact.to_string(), "compact");
}

#[test]
fn default_config_uses_documented_defaults() {
    let config = Config::default();
    assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
    assert_eq!(config.log_format(), LogFormat::Json);
    assert_eq!(config.max_line_bytes(), 64 * 1024 * 1024);
}
