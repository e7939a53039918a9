//!
//! Configuration loading system for DialectMux.
//!
//! Builds configuration from multiple layers in precedence order:
//! 1. Environment variables (highest priority)
//! 2. User config file (~/.config/dialectmux/config.toml)
//! 3. System config file (/etc/dialectmux/config.toml)
//! 4. Built-in defaults (lowest priority)
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use crate::config::paths;
use crate::config::{Config, LogLevel};
use crate::error::{ProxyError, Result};

use std::collections::BTreeMap;
use std::env;
use std::path::Path;

/* --- constants ------------------------------------------------------------------------------- */

/// Prefix shared by every configuration environment variable
const ENV_PREFIX: &str = "DIALECTMUX_";

/* --- types ----------------------------------------------------------------------------------- */

///
/// Configuration loader implementing the Builder pattern.
///
/// Provides a fluent interface for building configuration from multiple sources
/// in the correct precedence order. Each method returns self for chaining.
pub struct ConfigLoader {
    /// Current configuration being built
    config: Config,
    /// Environment variable overrides collected
    env_overrides: BTreeMap<String, String>,
    /// Whether defaults have been applied
    defaults_applied: bool,
}

/* --- implementations --------------------------------------------------------------------- */

impl ConfigLoader {
    /// Create a new configuration loader
    ///
    /// # Examples
    /// ```rust,no_run
    /// use dialectmux::config::loader::ConfigLoader;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = ConfigLoader::new()
    ///     .with_defaults()
    ///     .with_user_config()?
    ///     .with_env_vars()?
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new() -> Self {
        Self { config: Config::default(), env_overrides: BTreeMap::new(), defaults_applied: false }
    }

    /// Apply built-in default values
    pub fn with_defaults(mut self) -> Self {
        self.config = Config::default();
        self.defaults_applied = true;
        self
    }

    /// Load system-wide configuration file
    ///
    /// If the file doesn't exist, this is not considered an error.
    pub fn with_system_config(mut self) -> Result<Self> {
        let system_config_path = paths::system_config_file()?;

        if system_config_path.exists() {
            tracing::debug!("Loading system config from: {}", system_config_path.display());
            self.load_config_file(&system_config_path)?;
        } else {
            tracing::debug!("System config not found at: {}", system_config_path.display());
        }

        Ok(self)
    }

    /// Load user configuration file
    ///
    /// If the file doesn't exist, this is not considered an error.
    pub fn with_user_config(mut self) -> Result<Self> {
        let user_config_path = paths::user_config_file()?;

        if user_config_path.exists() {
            tracing::debug!("Loading user config from: {}", user_config_path.display());
            self.load_config_file(&user_config_path)?;
        } else {
            tracing::debug!("User config not found at: {}", user_config_path.display());
        }

        Ok(self)
    }

    /// Load configuration from specific file path
    ///
    /// # Arguments
    /// * `path` - Path to configuration file to load
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading custom config from: {}", path.display());
        self.load_config_file(path)?;
        Ok(self)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - DIALECTMUX_SERVER_PORT, DIALECTMUX_SERVER_LOG_LEVEL
    /// - DIALECTMUX_UPSTREAM_BASE_URL, DIALECTMUX_UPSTREAM_API_KEY
    /// - DIALECTMUX_UPSTREAM_TIMEOUT_SECS, DIALECTMUX_UPSTREAM_ENABLE_RETRIES
    /// - DIALECTMUX_UPSTREAM_MAX_RETRY_ATTEMPTS
    /// - DIALECTMUX_SANITIZE_ENABLED, DIALECTMUX_SANITIZE_MAX_BODY_BYTES
    /// - DIALECTMUX_STREAMING_DEDUPE_FINISH
    /// - PORT (legacy)
    pub fn with_env_vars(mut self) -> Result<Self> {
        tracing::debug!("Loading configuration from environment variables");

        for (key, value) in env::vars() {
            if key.starts_with(ENV_PREFIX) || key == "PORT" {
                self.env_overrides.insert(key, value);
            }
        }

        self.apply_env_overrides()?;

        Ok(self)
    }

    /// Build the final configuration, rejecting it on any error-level validation issue
    pub fn build(self) -> Result<Config> {
        let config = self.build_base()?;
        config.validate()?;

        tracing::info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Build configuration without validation
    ///
    /// Used by `doctor` and `config show`, which report issues instead of failing.
    pub fn build_base(self) -> Result<Config> {
        if !self.defaults_applied {
            return Err(ProxyError::Config(
                "Configuration loader must call with_defaults() before build()".to_string(),
            ));
        }

        tracing::debug!(
            "Base config: server.port={}, server.log_level={:?}, upstream.base_url={}, sanitize.enabled={}",
            self.config.server.port,
            self.config.server.log_level,
            self.config.upstream.base_url,
            self.config.sanitize.enabled
        );

        Ok(self.config)
    }

    /* --- private methods ----------------------------------------------------------------- */

    /// Load and merge configuration from a TOML file
    fn load_config_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();

        paths::validate_config_file(path)?;

        let contents = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::Config(format!(
                "Failed to read configuration file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let file_table: toml::Table = toml::from_str(&contents).map_err(|e| {
            ProxyError::Config(format!(
                "Failed to parse TOML configuration file '{}': {}\n\
                 \n\
                 Please check the syntax of your configuration file.\n\
                 Common issues:\n\
                 1. Missing quotes around string values\n\
                 2. Invalid TOML syntax\n\
                 3. Incorrect section names or field names\n\
                 \n\
                 Run 'dialectmux config validate' for more details.",
                path.display(),
                e
            ))
        })?;

        self.merge_table(file_table, path)?;

        tracing::debug!("Successfully loaded config from: {}", path.display());
        Ok(())
    }

    /// Merge the keys present in a config file over the current configuration
    ///
    /// Only keys the file actually sets are applied, so a later file can put a
    /// value back to its built-in default.
    fn merge_table(&mut self, file_table: toml::Table, path: &Path) -> Result<()> {
        let mut current = match toml::Value::try_from(&self.config) {
            Ok(toml::Value::Table(table)) => table,
            Ok(other) => {
                return Err(ProxyError::Config(format!(
                    "Current configuration serialized to a {} instead of a table",
                    other.type_str()
                )));
            }
            Err(e) => {
                return Err(ProxyError::Config(format!(
                    "Failed to serialize current configuration: {}",
                    e
                )));
            }
        };
        merge_tables(&mut current, file_table);

        self.config = toml::Value::Table(current).try_into().map_err(|e| {
            ProxyError::Config(format!(
                "Invalid value in configuration file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(())
    }

    /// Apply environment variable overrides to current configuration
    fn apply_env_overrides(&mut self) -> Result<()> {
        // Legacy PORT first so DIALECTMUX_SERVER_PORT wins when both are set
        if let Some(value) = self.env_overrides.get("PORT") {
            tracing::warn!(
                "PORT environment variable is deprecated. Please use DIALECTMUX_SERVER_PORT."
            );
            self.config.server.port = parse_number_env(value, "PORT")?;
        }

        for (key, value) in &self.env_overrides {
            match key.as_str() {
                "PORT" => {}

                // Server configuration
                "DIALECTMUX_SERVER_PORT" => {
                    self.config.server.port = parse_number_env(value, key)?;
                }
                "DIALECTMUX_SERVER_LOG_LEVEL" => {
                    self.config.server.log_level = value.parse::<LogLevel>()?;
                }

                // Upstream configuration
                "DIALECTMUX_UPSTREAM_BASE_URL" => {
                    self.config.upstream.base_url = value.trim().to_string();
                }
                "DIALECTMUX_UPSTREAM_API_KEY" => {
                    let key = value.trim();
                    self.config.upstream.api_key =
                        if key.is_empty() { None } else { Some(key.to_string()) };
                }
                "DIALECTMUX_UPSTREAM_TIMEOUT_SECS" => {
                    self.config.upstream.timeout_secs = parse_number_env(value, key)?;
                }
                "DIALECTMUX_UPSTREAM_ENABLE_RETRIES" => {
                    self.config.upstream.enable_retries = parse_bool_env(value, key)?;
                }
                "DIALECTMUX_UPSTREAM_MAX_RETRY_ATTEMPTS" => {
                    self.config.upstream.max_retry_attempts = parse_number_env(value, key)?;
                }

                // Sanitize configuration
                "DIALECTMUX_SANITIZE_ENABLED" => {
                    self.config.sanitize.enabled = parse_bool_env(value, key)?;
                }
                "DIALECTMUX_SANITIZE_MAX_BODY_BYTES" => {
                    self.config.sanitize.max_body_bytes = parse_number_env(value, key)?;
                }

                // Streaming configuration
                "DIALECTMUX_STREAMING_DEDUPE_FINISH" => {
                    self.config.streaming.dedupe_finish = parse_bool_env(value, key)?;
                }

                _ => {
                    tracing::debug!("Ignoring unknown environment variable: {}", key);
                }
            }
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/* --- utility functions ------------------------------------------------------------------- */

/// Recursively copy `overrides` into `base`, descending into nested tables
fn merge_tables(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        match value {
            toml::Value::Table(nested) => match base.get_mut(&key) {
                Some(toml::Value::Table(existing)) => merge_tables(existing, nested),
                _ => {
                    base.insert(key, toml::Value::Table(nested));
                }
            },
            other => {
                base.insert(key, other);
            }
        }
    }
}

/// Parse boolean value from environment variable
fn parse_bool_env(value: &str, var_name: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" | "enabled" => Ok(true),
        "false" | "no" | "0" | "off" | "disabled" => Ok(false),
        _ => Err(ProxyError::Config(format!(
            "Invalid boolean value for {}: '{}'\n\
             Valid values: true/false, yes/no, 1/0, on/off, enabled/disabled",
            var_name, value
        ))),
    }
}

/// Parse numeric value from environment variable
fn parse_number_env<T>(value: &str, var_name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| {
        ProxyError::Config(format!("Invalid {} value '{}': {}", var_name, value, e))
    })
}

/* --- tests ------------------------------------------------------------------------------- */
