//!
//! CLI configuration commands for DialectMux.
//!
//! This module provides command-line interface commands for configuration management:
//! - `config init` - Interactive configuration setup
//! - `config show` - Display current configuration
//! - `config validate` - Validate configuration
//! - `config edit` - Edit configuration in default editor
//! - `config path` - List configuration file locations
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use crate::config::paths;
use crate::config::{Config, LogLevel, ValidationSeverity};
use crate::error::{ProxyError, Result};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process::Command;
use std::str::FromStr;

/* --- types ----------------------------------------------------------------------------------- */

///
/// CLI configuration command handler.
///
/// Provides methods for handling all configuration-related CLI commands
/// with user-friendly interfaces and comprehensive error handling.
pub struct ConfigCli;

/* --- implementations --------------------------------------------------------------------- */

impl ConfigCli {
    /// Handle the `config init` command
    ///
    /// Provides an interactive setup wizard with defaults for every value.
    ///
    /// # Returns
    /// * `Ok(())` - Configuration successfully created
    /// * `Err(ProxyError)` - Configuration setup failed
    pub fn init() -> Result<()> {
        println!("DialectMux Configuration Setup");
        println!("==============================");
        println!();

        let config_file = paths::user_config_file()?;
        if config_file.exists() {
            println!("[WARNING] Configuration file already exists at:");
            println!("   {}", config_file.display());
            println!();

            if !Self::confirm("Do you want to overwrite the existing configuration?")? {
                println!("Configuration setup cancelled.");
                return Ok(());
            }
        }

        let config = Self::gather_config_interactively()?;

        let config_toml = toml::to_string_pretty(&config)
            .map_err(|e| ProxyError::Config(format!("Failed to serialize configuration: {}", e)))?;
        Self::write_config_file(&config_file, &config_toml)?;

        println!("[OK] Configuration saved to: {}", config_file.display());
        if config.upstream.api_key.is_some() {
            println!("[TIP] The file contains an API key; consider: chmod 600 '{}'", config_file.display());
        }

        println!();
        println!("Configuration setup complete!");
        println!("Run 'dialectmux config validate' to verify your configuration.");

        Ok(())
    }

    /// Handle the `config show` command
    ///
    /// Displays the effective configuration after merging all sources.
    ///
    /// # Returns
    /// * `Ok(())` - Configuration displayed successfully
    /// * `Err(ProxyError)` - Failed to load configuration
    pub fn show() -> Result<()> {
        println!("Current DialectMux Configuration");
        println!("================================");
        println!();

        let config = Config::load()?;

        println!("Server Configuration:");
        println!("  Port: {}", config.server.port);
        println!("  Log Level: {:?}", config.server.log_level);
        println!();

        println!("Upstream Configuration:");
        println!("  Base URL: {}", config.upstream.base_url);
        println!("  API Key: {}", mask_secret(config.upstream.api_key.as_deref()));
        println!("  Timeout: {}s", config.upstream.timeout_secs);
        println!("  Enable Retries: {}", config.upstream.enable_retries);
        println!("  Max Retry Attempts: {}", config.upstream.max_retry_attempts);
        println!();

        println!("Sanitize Configuration:");
        println!("  Enabled: {}", config.sanitize.enabled);
        println!("  Max Body Size: {} bytes", config.sanitize.max_body_bytes);
        println!();

        println!("Streaming Configuration:");
        println!("  Deduplicate Finish Reason: {}", config.streaming.dedupe_finish);
        println!();

        println!("Configuration Sources:");
        Self::print_sources();

        Ok(())
    }

    /// Handle the `config validate` command
    ///
    /// Loads the configuration and reports every validation issue.
    ///
    /// # Returns
    /// * `Ok(())` - Configuration is valid
    /// * `Err(ProxyError)` - Configuration loading or validation failed
    pub fn validate() -> Result<()> {
        println!("Validating DialectMux Configuration");
        println!("===================================");
        println!();

        print!("Loading configuration... ");
        flush_stdout();

        let config = match Config::load() {
            Ok(config) => {
                println!("[OK] Loaded");
                config
            }
            Err(e) => {
                println!("[ERROR] Failed");
                println!();
                println!("Configuration loading failed:");
                println!("{}", e);
                return Err(e);
            }
        };

        let issues = config.issues();
        let notes: Vec<_> =
            issues.iter().filter(|issue| issue.severity != ValidationSeverity::Error).collect();
        if !notes.is_empty() {
            println!();
            println!("Notes:");
            for issue in notes {
                println!("  {}", issue);
            }
        }

        println!();
        println!("Additional Checks:");

        print!("Checking port availability... ");
        flush_stdout();

        match std::net::TcpListener::bind(format!("127.0.0.1:{}", config.server.port)) {
            Ok(_) => {
                println!("[OK] Port {} appears to be available", config.server.port);
            }
            Err(_) => {
                println!("[WARNING] Port {} may be in use", config.server.port);
                println!("   This might be okay if another DialectMux instance is running");
            }
        }

        println!();
        println!("Configuration validation passed!");
        Ok(())
    }

    /// Handle the `config edit` command
    ///
    /// Opens the user configuration file in the default editor for manual editing.
    /// Creates a new configuration file from the example if none exists.
    ///
    /// # Returns
    /// * `Ok(())` - Editor opened successfully
    /// * `Err(ProxyError)` - Failed to open editor or create config file
    pub fn edit() -> Result<()> {
        let config_file = paths::user_config_file()?;

        if !config_file.exists() {
            println!("Configuration file doesn't exist. Creating example configuration...");
            Self::write_config_file(&config_file, Config::example_toml())?;
        }

        let editor =
            std::env::var("EDITOR").or_else(|_| std::env::var("VISUAL")).unwrap_or_else(|_| {
                if cfg!(target_os = "windows") {
                    "notepad".to_string()
                } else if cfg!(target_os = "macos") {
                    "open -e".to_string()
                } else {
                    "nano".to_string()
                }
            });

        println!("Opening configuration file in editor: {}", editor);
        println!("File: {}", config_file.display());
        println!();

        let mut editor_parts = editor.split_whitespace();
        let Some(editor_cmd) = editor_parts.next() else {
            return Err(ProxyError::Config("EDITOR is set but empty".to_string()));
        };

        let status = Command::new(editor_cmd)
            .args(editor_parts)
            .arg(&config_file)
            .status()
            .map_err(|e| {
                ProxyError::Config(format!(
                    "Failed to launch editor '{}': {}\n\
                     \n\
                     You can also edit the configuration file manually:\n\
                     {}\n\
                     \n\
                     Or set the EDITOR environment variable to your preferred editor.",
                    editor,
                    e,
                    config_file.display()
                ))
            })?;

        if status.success() {
            println!("Editor closed successfully.");
            println!("Run 'dialectmux config validate' to check your changes.");
        } else {
            println!("Editor exited with an error. Please check the configuration manually.");
        }

        Ok(())
    }

    /// Handle the `config path` command
    pub fn path() -> Result<()> {
        println!("Configuration file locations (in precedence order):");
        Self::print_sources();
        println!();
        println!("Environment variables with the DIALECTMUX_ prefix override both files.");
        Ok(())
    }

    /* --- private helper methods ---------------------------------------------------------- */

    fn print_sources() {
        let config_paths = paths::config_file_paths();
        for (i, path) in config_paths.iter().enumerate() {
            let status = if path.exists() { "exists" } else { "not found" };
            println!("  {} ({}): {}", path.display(), source_priority(i, config_paths.len()), status);
        }
    }

    fn write_config_file(config_file: &Path, contents: &str) -> Result<()> {
        if let Some(config_dir) = config_file.parent() {
            paths::ensure_directory_exists(config_dir)?;
        }

        fs::write(config_file, contents).map_err(|e| {
            ProxyError::Config(format!(
                "Failed to write configuration file '{}': {}",
                config_file.display(),
                e
            ))
        })
    }

    /// Gather configuration through interactive prompts
    fn gather_config_interactively() -> Result<Config> {
        let mut config = Config::default();

        println!("Server Configuration");
        println!("====================");

        config.server.port = Self::prompt_number("HTTP server port", config.server.port, 1, 65535)?;
        config.server.log_level = Self::prompt_log_level(
            "Logging level (trace/debug/info/warn/error)",
            config.server.log_level,
        )?;
        println!();

        println!("Upstream Configuration");
        println!("======================");

        config.upstream.base_url =
            Self::prompt_string("OpenAI-compatible backend URL", &config.upstream.base_url)?;

        let api_key = Self::prompt_string_with_default("API key (leave empty for none)", "", "")?;
        config.upstream.api_key = if api_key.is_empty() { None } else { Some(api_key) };

        config.upstream.timeout_secs = Self::prompt_number(
            "Request timeout in seconds",
            config.upstream.timeout_secs,
            1,
            3600,
        )?;

        config.upstream.enable_retries = Self::prompt_bool(
            "Enable automatic retries for rate limits",
            config.upstream.enable_retries,
        )?;
        if config.upstream.enable_retries {
            config.upstream.max_retry_attempts = Self::prompt_number(
                "Maximum retry attempts",
                config.upstream.max_retry_attempts,
                1,
                10,
            )?;
        }
        println!();

        println!("Request Sanitizing");
        println!("==================");

        config.sanitize.enabled =
            Self::prompt_bool("Normalize chat request bodies", config.sanitize.enabled)?;
        if config.sanitize.enabled {
            config.sanitize.max_body_bytes = Self::prompt_number(
                "Maximum request body size in bytes",
                config.sanitize.max_body_bytes,
                1024,
                512 * 1024 * 1024,
            )?;
        }
        println!();

        println!("Streaming Configuration");
        println!("=======================");

        config.streaming.dedupe_finish = Self::prompt_bool(
            "Keep only the first finish_reason in streamed responses",
            config.streaming.dedupe_finish,
        )?;

        Ok(config)
    }

    /// Prompt for a string value
    fn prompt_string(prompt: &str, current: &str) -> Result<String> {
        loop {
            if current.is_empty() {
                print!("{}: ", prompt);
            } else {
                print!("{} [{}]: ", prompt, current);
            }
            flush_stdout();

            let input = read_line()?;
            if input.is_empty() && !current.is_empty() {
                return Ok(current.to_string());
            } else if !input.is_empty() {
                return Ok(input);
            }

            println!("Please enter a value.");
        }
    }

    /// Prompt for a string value with a specific default
    fn prompt_string_with_default(prompt: &str, current: &str, default: &str) -> Result<String> {
        let display_current = if current.is_empty() { default } else { current };
        print!("{} [{}]: ", prompt, display_current);
        flush_stdout();

        let input = read_line()?;
        if input.is_empty() { Ok(display_current.to_string()) } else { Ok(input) }
    }

    /// Prompt for a numeric value within range
    fn prompt_number<T>(prompt: &str, current: T, min: T, max: T) -> Result<T>
    where
        T: std::fmt::Display + FromStr + PartialOrd + Copy,
        <T as FromStr>::Err: std::fmt::Display,
    {
        loop {
            print!("{} ({}-{}) [{}]: ", prompt, min, max, current);
            flush_stdout();

            let input = read_line()?;
            if input.is_empty() {
                return Ok(current);
            }

            match input.parse::<T>() {
                Ok(value) if value >= min && value <= max => return Ok(value),
                Ok(_) => println!("Value must be between {} and {}.", min, max),
                Err(e) => println!("Invalid number: {}", e),
            }
        }
    }

    /// Prompt for a boolean value
    fn prompt_bool(prompt: &str, default: bool) -> Result<bool> {
        loop {
            let default_str = if default { "Y/n" } else { "y/N" };
            print!("{} ({}): ", prompt, default_str);
            flush_stdout();

            match parse_yes_no(&read_line()?, default) {
                Some(value) => return Ok(value),
                None => println!("Please enter y/yes or n/no."),
            }
        }
    }

    /// Prompt for log level
    fn prompt_log_level(prompt: &str, default: LogLevel) -> Result<LogLevel> {
        loop {
            print!("{} [{:?}]: ", prompt, default);
            flush_stdout();

            let input = read_line()?;
            if input.is_empty() {
                return Ok(default);
            }

            match LogLevel::from_str(&input) {
                Ok(level) => return Ok(level),
                Err(_) => {
                    println!("Invalid log level. Valid options: trace, debug, info, warn, error");
                }
            }
        }
    }

    /// Prompt for confirmation
    fn confirm(message: &str) -> Result<bool> {
        Self::prompt_bool(message, false)
    }
}

fn flush_stdout() {
    let _ = io::stdout().flush();
}

fn read_line() -> Result<String> {
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .map_err(|e| ProxyError::Config(format!("Failed to read input: {}", e)))?;
    Ok(input.trim().to_string())
}

/// Interpret a yes/no answer, empty meaning `default`
fn parse_yes_no(input: &str, default: bool) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" | "true" | "1" => Some(true),
        "n" | "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

fn source_priority(index: usize, len: usize) -> &'static str {
    match index {
        0 => "highest priority",
        n if n + 1 == len => "lowest priority",
        _ => "medium priority",
    }
}

/// Show only the tail of a secret
fn mask_secret(secret: Option<&str>) -> String {
    match secret {
        None => "not set".to_string(),
        Some(value) => {
            let len = value.chars().count();
            if len <= 4 {
                return "****".to_string();
            }
            format!("****{}", value.chars().skip(len - 4).collect::<String>())
        }
    }
}

/* --- tests ------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yes_no() {
        assert_eq!(parse_yes_no("", true), Some(true));
        assert_eq!(parse_yes_no("", false), Some(false));
        assert_eq!(parse_yes_no(" YES ", false), Some(true));
        assert_eq!(parse_yes_no("0", true), Some(false));
        assert_eq!(parse_yes_no("maybe", true), None);
    }

    #[test]
    fn test_source_priority() {
        assert_eq!(source_priority(0, 2), "highest priority");
        assert_eq!(source_priority(1, 2), "lowest priority");
        assert_eq!(source_priority(1, 3), "medium priority");
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(None), "not set");
        assert_eq!(mask_secret(Some("abc")), "****");
        assert_eq!(mask_secret(Some("sk-123456")), "****3456");
    }

    #[test]
    fn test_default_config_serializes_to_loadable_toml() {
        let rendered = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.server.port, 3000);
        assert!(parsed.upstream.api_key.is_none());
    }
}
