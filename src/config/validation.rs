//!
//! Configuration validation for DialectMux.
//!
//! Checks network settings, the upstream backend definition and the sanitizer
//! limits. Issues are collected with a severity so `doctor` and `config validate`
//! can report everything at once while startup fails only on errors.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use crate::config::{Config, LogLevel};
use crate::error::{ProxyError, Result};
use std::fmt;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Severity of a single validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// Configuration cannot be used
    Error,
    /// Configuration works but is probably not what was intended
    Warning,
    /// Informational note
    Info,
}

///
/// One validation finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /** dotted config key, e.g. `upstream.base_url` */
    pub field: String,
    /** human-readable description of the problem */
    pub message: String,
    /** how to fix it, when there is an obvious fix */
    pub suggestion: Option<String>,
    /** how serious the finding is */
    pub severity: ValidationSeverity,
}

///
/// Configuration validator.
///
/// Validates:
/// - Network settings (port)
/// - Upstream backend (URL, credentials, timeouts, retries)
/// - Sanitizer limits
pub struct ConfigValidator<'a> {
    /// Configuration to validate
    config: &'a Config,
    /// Findings collected during validation
    issues: Vec<ValidationIssue>,
}

/* --- implementations --------------------------------------------------------------------- */

impl fmt::Display for ValidationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationSeverity::Error => write!(f, "error"),
            ValidationSeverity::Warning => write!(f, "warning"),
            ValidationSeverity::Info => write!(f, "info"),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " (hint: {})", suggestion)?;
        }
        Ok(())
    }
}

impl ValidationIssue {
    /// Whether this finding blocks startup
    pub fn is_error(&self) -> bool {
        self.severity == ValidationSeverity::Error
    }
}

impl<'a> ConfigValidator<'a> {
    /// Create a new configuration validator
    ///
    /// # Arguments
    /// * `config` - Configuration to validate
    pub fn new(config: &'a Config) -> Self {
        Self { config, issues: Vec::new() }
    }

    /// Run every check and return all findings
    pub fn collect(mut self) -> Vec<ValidationIssue> {
        self.run_checks();
        self.issues
    }

    /// Perform configuration validation
    ///
    /// Warnings are logged. Errors are gathered into one numbered message.
    ///
    /// # Returns
    /// * `Ok(())` - Configuration is valid
    /// * `Err(ProxyError)` - At least one error-level issue was found
    pub fn validate(self) -> Result<()> {
        let issues = self.collect();

        for issue in issues.iter().filter(|i| !i.is_error()) {
            tracing::warn!("Configuration {}", issue);
        }

        let errors: Vec<&ValidationIssue> = issues.iter().filter(|i| i.is_error()).collect();
        if !errors.is_empty() {
            let error_msg = format!(
                "Configuration validation failed with {} error(s):\n\n{}\n\
                 \n\
                 Please fix these issues and try again.\n\
                 Run 'dialectmux config init' to create a fresh configuration file.",
                errors.len(),
                errors
                    .iter()
                    .enumerate()
                    .map(|(i, e)| format!("{}. {}", i + 1, e))
                    .collect::<Vec<_>>()
                    .join("\n")
            );
            return Err(ProxyError::Config(error_msg));
        }

        tracing::debug!("Configuration validation passed with {} note(s)", issues.len());
        Ok(())
    }

    /* --- private validation methods ------------------------------------------------------ */

    fn run_checks(&mut self) {
        self.validate_server_config();
        self.validate_upstream_config();
        self.validate_sanitize_config();
        self.validate_operational_settings();
    }

    /// Validate server configuration
    fn validate_server_config(&mut self) {
        let port = self.config.server.port;

        if port == 0 {
            self.add_error(
                "server.port",
                format!("Invalid server port {}: must be between 1 and 65535", port),
                Some("use a port such as 3000"),
            );
            return;
        }

        if port < 1024 {
            self.add_warning(
                "server.port",
                format!("Server port {} requires root/administrator privileges", port),
                None,
            );
        }

        match port {
            80 | 443 => self.add_warning(
                "server.port",
                format!("Port {} is commonly used by web servers and may conflict", port),
                None,
            ),
            22 => self.add_warning(
                "server.port",
                "Port 22 is used by SSH and may conflict".to_string(),
                None,
            ),
            _ => {}
        }
    }

    /// Validate upstream backend configuration
    fn validate_upstream_config(&mut self) {
        let upstream = &self.config.upstream;

        match reqwest::Url::parse(&upstream.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                if url.query().is_some() {
                    self.add_warning(
                        "upstream.base_url",
                        "Base URL carries a query string; request paths are appended after it"
                            .to_string(),
                        None,
                    );
                }
            }
            Ok(url) => self.add_error(
                "upstream.base_url",
                format!("Unsupported scheme '{}' in '{}'", url.scheme(), upstream.base_url),
                Some("use an http:// or https:// URL"),
            ),
            Err(e) => self.add_error(
                "upstream.base_url",
                format!("Invalid URL '{}': {}", upstream.base_url, e),
                Some("e.g. base_url = \"http://127.0.0.1:8317\""),
            ),
        }

        if upstream.api_key.is_none() {
            self.add_info(
                "upstream.api_key",
                "No API key configured; client Authorization headers are forwarded as-is"
                    .to_string(),
            );
        }

        if upstream.timeout_secs == 0 {
            self.add_error(
                "upstream.timeout_secs",
                "Upstream timeout cannot be zero".to_string(),
                Some("300 seconds suits long streamed generations"),
            );
        }

        if upstream.enable_retries && upstream.max_retry_attempts == 0 {
            self.add_error(
                "upstream.max_retry_attempts",
                "Retries are enabled but max_retry_attempts is 0".to_string(),
                Some("set at least 1, or disable retries"),
            );
        } else if upstream.max_retry_attempts > 10 {
            self.add_warning(
                "upstream.max_retry_attempts",
                format!(
                    "High retry count ({}): may cause long delays on failures",
                    upstream.max_retry_attempts
                ),
                None,
            );
        }
    }

    /// Validate sanitizer limits
    fn validate_sanitize_config(&mut self) {
        let sanitize = &self.config.sanitize;

        if sanitize.max_body_bytes == 0 {
            self.add_error(
                "sanitize.max_body_bytes",
                "Maximum body size cannot be zero".to_string(),
                Some("the default is 16777216 (16 MiB)"),
            );
        } else if sanitize.max_body_bytes < 64 * 1024 {
            self.add_warning(
                "sanitize.max_body_bytes",
                format!(
                    "Small body limit ({} bytes) will reject long conversations",
                    sanitize.max_body_bytes
                ),
                None,
            );
        }

        if !sanitize.enabled {
            self.add_warning(
                "sanitize.enabled",
                "Sanitizing is disabled: requests are forwarded unmodified".to_string(),
                None,
            );
        }
    }

    /// Settings that are valid but risky in production
    fn validate_operational_settings(&mut self) {
        if self.config.server.log_level == LogLevel::Trace {
            self.add_warning(
                "server.log_level",
                "Trace log level enabled: may log sensitive information in production".to_string(),
                Some("use info outside of debugging sessions"),
            );
        }
    }

    fn push(
        &mut self,
        severity: ValidationSeverity,
        field: &str,
        message: String,
        suggestion: Option<&str>,
    ) {
        tracing::debug!("Validation {}: {}: {}", severity, field, message);
        self.issues.push(ValidationIssue {
            field: field.to_string(),
            message,
            suggestion: suggestion.map(str::to_string),
            severity,
        });
    }

    fn add_error(&mut self, field: &str, message: String, suggestion: Option<&str>) {
        self.push(ValidationSeverity::Error, field, message, suggestion);
    }

    fn add_warning(&mut self, field: &str, message: String, suggestion: Option<&str>) {
        self.push(ValidationSeverity::Warning, field, message, suggestion);
    }

    fn add_info(&mut self, field: &str, message: String) {
        self.push(ValidationSeverity::Info, field, message, None);
    }
}

/* --- tests ------------------------------------------------------------------------------- */
