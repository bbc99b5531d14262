//! Tests for logging configuration and format parsing
//!
//! Tests the pure functions in the logging module that decide log format and
//! level from the environment and the verbose setting.

use mqtt2template::observability::logging::{default_level, parse_level, LogFormat};
use tracing::Level;

#[test]
fn test_log_format_parse_json() {
    assert!(matches!(LogFormat::parse("json"), LogFormat::Json));
    assert!(matches!(LogFormat::parse("JSON"), LogFormat::Json));
}

#[test]
fn test_log_format_parse_pretty() {
    assert!(matches!(LogFormat::parse("pretty"), LogFormat::Pretty));
    assert!(matches!(LogFormat::parse("Pretty"), LogFormat::Pretty));
}

#[test]
fn test_log_format_parse_compact() {
    assert!(matches!(LogFormat::parse("compact"), LogFormat::Compact));
    assert!(matches!(LogFormat::parse("COMPACT"), LogFormat::Compact));
}

#[test]
fn test_log_format_parse_invalid_defaults_to_json() {
    assert!(matches!(LogFormat::parse("xml"), LogFormat::Json));
    assert!(matches!(LogFormat::parse("123"), LogFormat::Json));
}

#[test]
fn test_quiet_unless_verbose() {
    // Informational progress is only visible when verbose
    assert!(default_level(false) < Level::INFO);
    assert_eq!(default_level(true), Level::INFO);
}

#[test]
fn test_explicit_level_overrides_verbose() {
    assert_eq!(parse_level(Some("debug"), false), Level::DEBUG);
    assert_eq!(parse_level(Some("error"), true), Level::ERROR);
}

#[test]
fn test_unknown_level_falls_back_to_verbose_default() {
    assert_eq!(parse_level(Some("chatty"), true), Level::INFO);
    assert_eq!(parse_level(Some("chatty"), false), Level::WARN);
}
