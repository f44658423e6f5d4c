//! Integration tests for the logging system

use bridge_traits::time::LogLevel;
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};
use core_runtime::Error;

#[test]
fn test_logging_config_defaults() {
    let config = LoggingConfig::default();

    assert_eq!(config.level, LogLevel::Info);
    assert!(config.redact_pii);
    assert!(config.filter.is_none());
    assert!(config.logger_sink.is_none());
    assert!(config.display_target);
}

#[test]
fn test_pii_redaction_credentials() {
    assert_eq!(redact_if_sensitive("token", "4f1c2e"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("access_token", "4f1c2e"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("password", "secret1"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("authorization", "Bearer 4f1c2e"), "[REDACTED]");
}

#[test]
fn test_pii_redaction_logins() {
    let redacted = redact_if_sensitive("login", "alice");
    assert!(redacted.starts_with('a'));
    assert!(!redacted.contains("lice"));

    let redacted = redact_if_sensitive("account", "alice@example.com");
    assert!(!redacted.contains("example.com"));
}

#[test]
fn test_pii_redaction_normal_values() {
    assert_eq!(redact_if_sensitive("url", "/shows?page=1"), "/shows?page=1");
    assert_eq!(redact_if_sensitive("correlation_id", "42"), "42");
    assert_eq!(redact_if_sensitive("route", "login-3"), "login-3");
}

#[test]
fn test_init_logging_only_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn);

    assert!(init_logging(config.clone()).is_ok());
    assert!(matches!(init_logging(config), Err(Error::Logging(_))));

    tracing::warn!(url = "/shows", "Logging initialized in integration test");
}

#[test]
fn test_init_logging_rejects_bad_filter() {
    let config = LoggingConfig::default().with_filter("core_auth=verbose");
    assert!(matches!(init_logging(config), Err(Error::Config(_))));
}
