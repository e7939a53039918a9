//! # DialectMux - Chat Request Normalization Gateway
//!
//! A proxy server placed in front of one OpenAI-compatible backend. Clients may
//! send chat requests in either the OpenAI or the Anthropic dialect; DialectMux
//! rewrites them into the backend dialect before forwarding.
//!
//! ## Features
//!
//! - **Dialect normalization**: `tool_use` / `tool_result` blocks become `tool_calls` / `tool` messages
//! - **Schema cleanup**: JSON-Schema keywords the backend rejects are pruned from tool definitions
//! - **Thinking models**: `system` instructions are folded into the first user turn
//! - **Streaming cleanup**: one finish reason and one `[DONE]` per stream
//! - **Configurable Logging**: Structured logging with tracing
//!
//! ## Quick Start
//!
//! ```bash
//! export DIALECTMUX_UPSTREAM_BASE_URL="http://127.0.0.1:8317"
//! dialectmux
//! ```
//!
//! ## Configuration
//!
//! Configuration is layered: built-in defaults, `/etc/dialectmux/config.toml`,
//! the user configuration file, then `DIALECTMUX_*` environment variables.
//!
//! ```bash
//! export DIALECTMUX_SERVER_PORT=3000
//! export DIALECTMUX_SERVER_LOG_LEVEL=info
//! export DIALECTMUX_UPSTREAM_API_KEY="sk-..."
//! export DIALECTMUX_STREAMING_DEDUPE_FINISH=true
//! ```
//!
//! ## API Usage
//!
//! ```bash
//! curl -X POST http://localhost:3000/v1/chat/completions \
//!   -H "Content-Type: application/json" \
//!   -d '{
//!     "model": "gemini-2.5-thinking",
//!     "system": "Answer briefly.",
//!     "messages": [{"role": "user", "content": "Hello!"}]
//!   }'
//! ```
//!
//! ## License
//!
//! Licensed under either of Apache License, Version 2.0 or MIT license at your option.
//!
//! Authors: Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp
//!

/* --- uses ------------------------------------------------------------------------------------ */

use std::env;

use axum::Router;
use tracing::info;

use dialectmux::config::cli::ConfigCli;
use dialectmux::config::{Config, ValidationSeverity};
use dialectmux::create_app;
use dialectmux::error::{ProxyError, Result};

/* --- constants ------------------------------------------------------------------------------ */

/** the version as defined in cargo.toml */
const VERSION: &str = env!("CARGO_PKG_VERSION");

/* --- start of code -------------------------------------------------------------------------- */

///
/// Main application entry point for the DialectMux gateway.
///
/// Handles CLI commands, loads layered configuration, initializes logging
/// and starts the HTTP server.
#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // Handle CLI arguments before config loading
    handle_cli_args();

    if let Err(e) = run().await {
        // Print error message line by line to ensure proper formatting
        let error_msg = format!("{}", e);
        eprintln!("Error:");
        for line in error_msg.lines() {
            eprintln!("{}", line);
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::load()?;
    initialize_logging(&config);

    let app = create_app(config.clone())?;

    start_server(&config, app).await
}

///
/// Handle command line arguments like --version and --help before config loading.
///
/// This ensures these commands work even without proper configuration.
fn handle_cli_args() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return; // No arguments, proceed with normal startup
    }

    match args[1].as_str() {
        "--version" | "-V" => {
            println!("dialectmux {}", VERSION);
            std::process::exit(0);
        }
        "--help" | "-h" => {
            print_help();
            std::process::exit(0);
        }
        "doctor" => {
            run_doctor();
            std::process::exit(0);
        }
        "validate" => {
            let exit_code = run_validate();
            std::process::exit(exit_code);
        }
        "config" => {
            let exit_code = run_config_command(args.get(2).map(String::as_str));
            std::process::exit(exit_code);
        }
        _ => {
            // Unknown command or option - show error and help
            if args[1].starts_with('-') {
                eprintln!("Error: Unknown option: {}", args[1]);
                eprintln!();
                print_help();
                std::process::exit(1);
            } else {
                eprintln!("Error: Unknown command: {}", args[1]);
                eprintln!();
                eprintln!("Available commands:");
                eprintln!("  doctor    - Run configuration health check");
                eprintln!("  validate  - Validate configuration");
                eprintln!("  config    - Manage configuration files (init, show, validate, edit, path)");
                eprintln!();
                eprintln!("Available options:");
                eprintln!("  --version, -V  - Show version");
                eprintln!("  --help, -h     - Show help");
                eprintln!();
                eprintln!("Run 'dialectmux --help' for more information.");
                std::process::exit(1);
            }
        }
    }
}

///
/// Dispatch a `config` subcommand.
///
/// # Returns
///  * process exit code
fn run_config_command(subcommand: Option<&str>) -> i32 {
    let result = match subcommand {
        Some("init") => ConfigCli::init(),
        Some("show") => ConfigCli::show(),
        Some("validate") => ConfigCli::validate(),
        Some("edit") => ConfigCli::edit(),
        Some("path") => ConfigCli::path(),
        Some(other) => {
            eprintln!("Error: Unknown config command: {}", other);
            eprintln!("Available config commands: init, show, validate, edit, path");
            return 1;
        }
        None => {
            eprintln!("Error: Missing config command");
            eprintln!("Available config commands: init, show, validate, edit, path");
            return 1;
        }
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("[ERROR] {}", e);
            1
        }
    }
}

///
/// Print help information for the DialectMux CLI.
fn print_help() {
    println!("DialectMux v{}", VERSION);
    println!("Gateway normalizing OpenAI-style and Anthropic-style chat requests for one backend");
    println!();
    println!("USAGE:");
    println!("    dialectmux [COMMAND] [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    doctor              Check configuration and system health");
    println!("    validate            Validate configuration and exit");
    println!("    config init         Create a configuration file interactively");
    println!("    config show         Show the effective configuration");
    println!("    config validate     Validate configuration with extra checks");
    println!("    config edit         Open the configuration file in $EDITOR");
    println!("    config path         List configuration file locations");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help          Print help information");
    println!("    -V, --version       Print version information");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("    DIALECTMUX_SERVER_PORT                 Server port (default: 3000)");
    println!(
        "    DIALECTMUX_SERVER_LOG_LEVEL            Log level: trace, debug, info, warn, error (default: info)"
    );
    println!(
        "    DIALECTMUX_UPSTREAM_BASE_URL           Backend base URL (default: http://127.0.0.1:8317)"
    );
    println!("    DIALECTMUX_UPSTREAM_API_KEY            Bearer token for the backend");
    println!("    DIALECTMUX_UPSTREAM_TIMEOUT_SECS       Request timeout (default: 300)");
    println!("    DIALECTMUX_UPSTREAM_ENABLE_RETRIES     Retry on 429 (default: true)");
    println!("    DIALECTMUX_UPSTREAM_MAX_RETRY_ATTEMPTS Attempts when retrying (default: 3)");
    println!("    DIALECTMUX_SANITIZE_ENABLED            Normalize request bodies (default: true)");
    println!("    DIALECTMUX_SANITIZE_MAX_BODY_BYTES     Largest accepted body (default: 16777216)");
    println!("    DIALECTMUX_STREAMING_DEDUPE_FINISH     One finish_reason per stream (default: true)");
    println!();
    println!("EXAMPLES:");
    println!("    dialectmux                    Start the proxy server");
    println!("    dialectmux doctor             Check configuration");
    println!("    dialectmux config init        Create ~/.config/dialectmux/config.toml");
}

///
/// Run the doctor command to check configuration and system health.
///
/// Performs comprehensive checks and provides helpful diagnostics.
fn run_doctor() {
    println!("DialectMux Doctor - Configuration Health Check");
    println!("{}", "=".repeat(60));
    println!();

    if std::path::Path::new(".env").exists() {
        println!("[OK] Found .env file");
    } else {
        println!("[INFO] No .env file found (using environment variables)");
    }
    println!();

    println!("Configuration Files:");
    for path in dialectmux::config::paths::config_file_paths() {
        let status = if path.exists() { "[OK]" } else { "[INFO]" };
        let note = if path.exists() { "found" } else { "not present" };
        println!("  {} {}: {}", status, path.display(), note);
    }
    println!();

    println!("Configuration Validation:");
    let config = match dialectmux::config::loader::ConfigLoader::new()
        .with_defaults()
        .with_system_config()
        .and_then(|loader| loader.with_user_config())
        .and_then(|loader| loader.with_env_vars())
        .and_then(|loader| loader.build_base())
    {
        Ok(config) => {
            println!("  [OK] Configuration loaded successfully");
            println!();
            config
        }
        Err(e) => {
            println!("  [ERROR] Failed to load configuration:");
            println!("     {}", e);
            println!();
            println!("Suggestions:");
            println!("   1. Check the files listed above for TOML syntax errors");
            println!("   2. Check DIALECTMUX_* environment variables for invalid values");
            println!("   3. Run 'dialectmux doctor' again to verify");
            return;
        }
    };

    let issues = config.issues();
    if issues.is_empty() {
        println!("  [OK] No validation issues found");
        println!();
        println!("[SUCCESS] Configuration looks good! You're ready to run DialectMux.");
        return;
    }

    let mut has_errors = false;
    for (severity, tag, noun) in [
        (ValidationSeverity::Error, "ERROR", "error(s)"),
        (ValidationSeverity::Warning, "WARNING", "warning(s)"),
        (ValidationSeverity::Info, "INFO", "info message(s)"),
    ] {
        let matching: Vec<_> = issues.iter().filter(|i| i.severity == severity).collect();
        if matching.is_empty() {
            continue;
        }
        has_errors |= severity == ValidationSeverity::Error;

        println!("  [{}] Found {} {}:", tag, matching.len(), noun);
        for issue in &matching {
            println!("     • {}: {}", issue.field, issue.message);
            if let Some(suggestion) = &issue.suggestion {
                println!("       [TIP] {}", suggestion);
            }
        }
        println!();
    }

    if has_errors {
        println!("[ERROR] Configuration has errors. Please fix them before running DialectMux.");
    } else {
        println!("[SUCCESS] Configuration has warnings but should work. Review suggestions above.");
    }
}

///
/// Run the validate command to validate configuration and exit.
///
/// Returns exit code 0 if valid, 1 if invalid.
fn run_validate() -> i32 {
    match Config::load() {
        Ok(_) => {
            println!("[OK] Configuration is valid");
            0
        }
        Err(e) => {
            eprintln!("[ERROR] {}", e);
            1
        }
    }
}

///
/// Initialize logging with the specified log level.
///
/// # Arguments
///  * `config` - application configuration containing log level settings
fn initialize_logging(config: &Config) {
    tracing_subscriber::fmt()
        .with_max_level(config.server.log_level.to_tracing_level())
        .with_target(false)
        .init();
}

///
/// Start the HTTP server and log startup information.
///
/// # Arguments
///  * `config` - application configuration
///  * `app` - configured Axum application
///
/// # Returns
///  * `Ok(())` when server shuts down gracefully
///  * `ProxyError::Http` if server binding or startup fails
async fn start_server(config: &Config, app: Router) -> Result<()> {
    let port = config.server.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await.map_err(|e| {
        let error_msg = format!("Failed to bind to port {}: {}", port, e);

        if e.kind() == std::io::ErrorKind::AddrInUse {
            ProxyError::Http(format!(
                "{}\n\n\
                Port {} is already in use. Here are some solutions:\n\n\
                1. Close the other instance:\n\
                   • Find the process using port {}:\n\
                     lsof -i :{}\n\
                   • Kill the process:\n\
                     kill -9 <PID>\n\n\
                2. Change the port:\n\
                   export DIALECTMUX_SERVER_PORT=3001\n\
                   dialectmux\n\n\
                Run 'dialectmux doctor' for more help.",
                error_msg, port, port, port
            ))
        } else {
            ProxyError::Http(format!(
                "{}\n\n\
                To fix this:\n\
                • Check if the port is valid (1-65535)\n\
                • Ensure you have permission to bind to the port\n\
                • Try a different port: export DIALECTMUX_SERVER_PORT=3001\n\n\
                Run 'dialectmux doctor' for more help.",
                error_msg
            ))
        }
    })?;

    log_startup_info(config);

    axum::serve(listener, app)
        .await
        .map_err(|e| ProxyError::Http(format!("Server error: {}", e)))?;

    Ok(())
}

///
/// Log startup information and configuration details.
///
/// # Arguments
///  * `config` - application configuration
fn log_startup_info(config: &Config) {
    info!("DialectMux v{} running on port {}", VERSION, config.server.port);
    info!("Forwarding /v1/* to {}", config.upstream.base_url);
    info!(
        "Request sanitizing: {}, finish_reason dedupe: {}",
        if config.sanitize.enabled { "on" } else { "off" },
        if config.streaming.dedupe_finish { "on" } else { "off" }
    );

    if config.server.log_level.is_trace_enabled() {
        info!(
            "[TRACE] Trace logging is ENABLED (log_level={:?}) - every sanitizer stage will be logged",
            config.server.log_level
        );
    }
}
