//! Validation tests for DialectMux configuration validation

use dialectmux::config::{Config, ValidationIssue, ValidationSeverity};

fn issues_for(field: &str, config: &Config) -> Vec<ValidationIssue> {
    config.issues().into_iter().filter(|issue| issue.field == field).collect()
}

fn has(config: &Config, field: &str, severity: ValidationSeverity) -> bool {
    issues_for(field, config).iter().any(|issue| issue.severity == severity)
}

/// Test that the default configuration has no errors
#[test]
fn test_defaults_are_valid() {
    let config = Config::default();
    assert!(config.validate().is_ok(), "Default config should validate");
    assert!(
        config.issues().iter().all(|issue| !issue.is_error()),
        "Default config should have no error-level issues"
    );
}

/// Test that validation detects invalid port
#[test]
fn test_validation_invalid_port() {
    let mut config = Config::default();
    config.server.port = 0;

    assert!(has(&config, "server.port", ValidationSeverity::Error), "Should detect port 0");
    assert!(config.validate().is_err());
}

/// Test that privileged and well-known ports only warn
#[test]
fn test_validation_privileged_port_warns() {
    let mut config = Config::default();
    config.server.port = 443;

    assert!(has(&config, "server.port", ValidationSeverity::Warning));
    assert!(!has(&config, "server.port", ValidationSeverity::Error));
    assert!(config.validate().is_ok());
}

/// Test that validation rejects malformed and non-http upstream URLs
#[test]
fn test_validation_upstream_url() {
    let mut config = Config::default();

    config.upstream.base_url = "not a url".to_string();
    assert!(has(&config, "upstream.base_url", ValidationSeverity::Error));

    config.upstream.base_url = "ftp://files.example.com".to_string();
    assert!(has(&config, "upstream.base_url", ValidationSeverity::Error));

    config.upstream.base_url = "https://api.example.com/openai?tenant=a".to_string();
    assert!(has(&config, "upstream.base_url", ValidationSeverity::Warning));
    assert!(!has(&config, "upstream.base_url", ValidationSeverity::Error));
}

/// Test that a missing API key is informational only
#[test]
fn test_validation_missing_api_key_is_info() {
    let mut config = Config::default();
    assert!(has(&config, "upstream.api_key", ValidationSeverity::Info));

    config.upstream.api_key = Some("sk-test".to_string());
    assert!(issues_for("upstream.api_key", &config).is_empty());
}

/// Test retry and timeout limits
#[test]
fn test_validation_retry_and_timeout() {
    let mut config = Config::default();
    config.upstream.timeout_secs = 0;
    assert!(has(&config, "upstream.timeout_secs", ValidationSeverity::Error));

    let mut config = Config::default();
    config.upstream.max_retry_attempts = 0;
    assert!(has(&config, "upstream.max_retry_attempts", ValidationSeverity::Error));

    config.upstream.enable_retries = false;
    assert!(
        !has(&config, "upstream.max_retry_attempts", ValidationSeverity::Error),
        "Zero attempts is fine when retries are disabled"
    );

    let mut config = Config::default();
    config.upstream.max_retry_attempts = 25;
    assert!(has(&config, "upstream.max_retry_attempts", ValidationSeverity::Warning));
}

/// Test sanitizer body limits and the disabled switch
#[test]
fn test_validation_sanitize_settings() {
    let mut config = Config::default();
    config.sanitize.max_body_bytes = 0;
    assert!(has(&config, "sanitize.max_body_bytes", ValidationSeverity::Error));

    config.sanitize.max_body_bytes = 1024;
    assert!(has(&config, "sanitize.max_body_bytes", ValidationSeverity::Warning));

    let mut config = Config::default();
    config.sanitize.enabled = false;
    assert!(has(&config, "sanitize.enabled", ValidationSeverity::Warning));
}

/// Test that the combined error message numbers every error
#[test]
fn test_validation_error_message_lists_all_errors() {
    let mut config = Config::default();
    config.server.port = 0;
    config.upstream.timeout_secs = 0;

    let message = config.validate().unwrap_err().to_string();
    assert!(message.contains("2 error(s)"), "got: {}", message);
    assert!(message.contains("1. [error] server.port"), "got: {}", message);
    assert!(message.contains("2. [error] upstream.timeout_secs"), "got: {}", message);
}

/// Test issue display format
#[test]
fn test_issue_display() {
    let issue = ValidationIssue {
        field: "server.port".to_string(),
        message: "bad".to_string(),
        suggestion: Some("use 3000".to_string()),
        severity: ValidationSeverity::Error,
    };
    assert_eq!(issue.to_string(), "[error] server.port: bad (hint: use 3000)");
}
