//!
//! Configuration management for DialectMux.
//!
//! Layered configuration built from:
//! - Platform-native configuration directories (XDG on Linux, standard paths on macOS/Windows)
//! - TOML format for human-readable configuration files
//! - Environment variables with the `DIALECTMUX_` prefix
//!
//! Submodules:
//! - `loader.rs` - layered loading
//! - `paths.rs` - platform-native path resolution
//! - `validation.rs` - validation issues and the validator
//! - `cli.rs` - `config` CLI commands
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- modules --------------------------------------------------------------------------------- */

pub mod cli;
pub mod loader;
pub mod paths;
pub mod validation;

/* --- uses ------------------------------------------------------------------------------------ */

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, Result};

pub use validation::{ValidationIssue, ValidationSeverity};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Main application configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream backend configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Request sanitizing configuration
    #[serde(default)]
    pub sanitize: SanitizeConfig,
    /// Streaming response configuration
    #[serde(default)]
    pub streaming: StreamingConfig,
}

///
/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server port number
    #[serde(default = "default_port")]
    pub port: u16,
    /// Application logging level
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
}

///
/// Upstream chat-completion backend.
///
/// The backend speaks the canonical OpenAI-compatible dialect only; every
/// request reaching it has already been through the sanitizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL the original request path is appended to
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token attached when the client sends no Authorization header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Whether to retry requests rejected with 429
    #[serde(default = "default_enable_retries")]
    pub enable_retries: bool,
    /// Maximum attempts when retries are enabled
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
}

///
/// Request sanitizing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizeConfig {
    /// Whether request bodies are normalized before forwarding
    #[serde(default = "default_sanitize_enabled")]
    pub enabled: bool,
    /// Largest request body accepted for sanitizing, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

///
/// Streaming response configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Suppress repeated finish reasons after the first one in a stream
    #[serde(default = "default_dedupe_finish")]
    pub dedupe_finish: bool,
}

///
/// Logging level enumeration.
///
/// Defines available log levels compatible with tracing crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/* --- defaults -------------------------------------------------------------------------------- */

/// Default HTTP port
fn default_port() -> u16 {
    3000
}

/// Default logging level
fn default_log_level() -> LogLevel {
    LogLevel::Info
}

/// Default upstream, a backend on the local machine
fn default_base_url() -> String {
    "http://127.0.0.1:8317".to_string()
}

/// Default upstream timeout (5 minutes, long generations stream for a while)
fn default_timeout_secs() -> u64 {
    300
}

/// Default retry behavior
fn default_enable_retries() -> bool {
    true
}

/// Default maximum retry attempts
fn default_max_retry_attempts() -> u32 {
    3
}

fn default_sanitize_enabled() -> bool {
    true
}

/// Default body limit (16 MiB)
fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_dedupe_finish() -> bool {
    true
}

/* --- implementations --------------------------------------------------------------------- */

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port(), log_level: default_log_level() }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            enable_retries: default_enable_retries(),
            max_retry_attempts: default_max_retry_attempts(),
        }
    }
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self { enabled: default_sanitize_enabled(), max_body_bytes: default_max_body_bytes() }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self { dedupe_finish: default_dedupe_finish() }
    }
}

impl Config {
    /// Load configuration from the standard hierarchy:
    /// 1. Environment variables (highest priority)
    /// 2. User config file (~/.config/dialectmux/config.toml)
    /// 3. System config file (/etc/dialectmux/config.toml)
    /// 4. Built-in defaults (lowest priority)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded and validated configuration
    /// * `Err(ProxyError)` - Configuration loading or validation failed
    ///
    /// # Examples
    /// ```rust,no_run
    /// use dialectmux::config::Config;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = Config::load()?;
    /// println!("Server will run on port {}", config.server.port);
    /// # Ok(())
    /// # }
    /// ```
    pub fn load() -> Result<Self> {
        loader::ConfigLoader::new()
            .with_defaults()
            .with_system_config()?
            .with_user_config()?
            .with_env_vars()?
            .build()
    }

    /// Validate the current configuration, failing on the first error-level issue set
    pub fn validate(&self) -> Result<()> {
        validation::ConfigValidator::new(self).validate()
    }

    /// Collect every validation issue without failing
    pub fn issues(&self) -> Vec<ValidationIssue> {
        validation::ConfigValidator::new(self).collect()
    }

    /// Full URL for a request path (path and query as received from the client)
    pub fn upstream_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.upstream.base_url.trim_end_matches('/'), path_and_query)
    }

    /// Get configuration file example as TOML string
    pub fn example_toml() -> &'static str {
        r#"# DialectMux Configuration
# This file should be placed at:
#   Linux/Unix: ~/.config/dialectmux/config.toml
#   macOS: ~/Library/Application Support/com.SkyCorp.dialectmux/config.toml
#   Windows: %APPDATA%/SkyCorp/dialectmux/config/config.toml

[server]
# HTTP server port (default: 3000)
port = 3000

# Logging level: trace, debug, info, warn, error (default: info)
log_level = "info"

[upstream]
# OpenAI-compatible backend; the client request path is appended to this URL
base_url = "http://127.0.0.1:8317"

# Bearer token used when the client does not send its own Authorization header
# api_key = "sk-..."

# Whole-request timeout in seconds (default: 300)
timeout_secs = 300

# Retry requests rejected with 429 (default: true)
enable_retries = true
max_retry_attempts = 3

[sanitize]
# Normalize chat request bodies before forwarding (default: true)
enabled = true

# Largest request body accepted, in bytes (default: 16 MiB)
max_body_bytes = 16777216

[streaming]
# Keep only the first finish_reason in a streamed response (default: true)
dedupe_finish = true
"#
    }
}

impl LogLevel {
    /// Convert to tracing::Level for logging setup
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }

    /// Check if trace-level pipeline diagnostics should be emitted
    pub fn is_trace_enabled(self) -> bool {
        matches!(self, LogLevel::Trace | LogLevel::Debug)
    }
}

impl FromStr for LogLevel {
    type Err = ProxyError;

    /// Parse from string (case-insensitive)
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ProxyError::Config(format!(
                "Invalid log level '{}'. Valid levels are: trace, debug, info, warn, error",
                s
            ))),
        }
    }
}

/* --- tests ------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_toml_parses_to_defaults() {
        let parsed: Config = toml::from_str(Config::example_toml()).expect("example should parse");
        let defaults = Config::default();

        assert_eq!(parsed.server.port, defaults.server.port);
        assert_eq!(parsed.upstream.base_url, defaults.upstream.base_url);
        assert_eq!(parsed.sanitize.max_body_bytes, defaults.sanitize.max_body_bytes);
        assert!(parsed.upstream.api_key.is_none());
        assert!(parsed.streaming.dedupe_finish);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let parsed: Config = toml::from_str("[upstream]\nbase_url = \"http://backend:9000\"\n")
            .expect("partial config should parse");

        assert_eq!(parsed.upstream.base_url, "http://backend:9000");
        assert_eq!(parsed.upstream.timeout_secs, 300);
        assert_eq!(parsed.server.port, 3000);
        assert!(parsed.sanitize.enabled);
    }

    #[test]
    fn test_upstream_url_joins_without_double_slash() {
        let mut config = Config::default();
        config.upstream.base_url = "http://backend:9000/".to_string();

        assert_eq!(
            config.upstream_url("/v1/chat/completions?x=1"),
            "http://backend:9000/v1/chat/completions?x=1"
        );
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("TRACE".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert!(LogLevel::Debug.is_trace_enabled());
        assert!(!LogLevel::Info.is_trace_enabled());
    }
}
