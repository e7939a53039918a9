//! # DialectMux - Chat Request Normalization Gateway
//!
//! This crate provides a proxy that sits in front of a single OpenAI-compatible
//! backend and accepts chat requests written in either the OpenAI or the
//! Anthropic dialect. Request bodies are rewritten into the backend dialect
//! before forwarding, and streamed responses are cleaned up so that each stream
//! ends with one finish reason and one `[DONE]`.
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use dialectmux::{Config, create_app};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load configuration
//!     let config = Config::load()?;
//!
//!     // Create the application
//!     let app = create_app(config)?;
//!
//!     // Start server
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The pipeline can also be used on its own:
//!
//! ```rust
//! use bytes::Bytes;
//! use dialectmux::RequestSanitizer;
//! use dialectmux::config::LogLevel;
//!
//! let sanitizer = RequestSanitizer::new(LogLevel::Info);
//! let (body, stats) = sanitizer.sanitize(Bytes::from(r#"{"tool_choice":"required"}"#));
//! assert_eq!(&body[..], br#"{"tool_choice":"auto"}"#);
//! assert_eq!(stats.total_removed, 1);
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Layered configuration (defaults, files, environment) and validation
//! - [`sanitize`] - Request normalization pipeline
//! - [`stream`] - Streaming finish-reason deduplication
//! - [`server`] - HTTP server setup and route handlers
//! - [`error`] - Error types and handling

pub mod config;
pub mod error;
pub mod sanitize;
pub mod server;
pub mod stream;

// Re-export commonly used types
pub use config::{Config, ValidationIssue, ValidationSeverity};
pub use error::ProxyError;
pub use sanitize::{RequestSanitizer, SanitizeStats};
pub use stream::FinishDeduplicator;

/// Creates a new DialectMux application with the given configuration.
///
/// Every `/v1/*` route is proxied to the upstream; chat request bodies pass
/// through the sanitizing middleware first.
///
/// # Arguments
///
/// * `config` - Application configuration
///
/// # Returns
///
/// Returns an Axum Router that can be served directly.
///
/// # Errors
///
/// Returns a `ProxyError` if the HTTP client cannot be initialized.
///
/// # Examples
///
/// ```rust,no_run
/// use dialectmux::{Config, create_app};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let app = create_app(Config::default())?;
///
///     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
///     axum::serve(listener, app).await?;
///     Ok(())
/// }
/// ```
pub fn create_app(config: Config) -> Result<axum::Router, ProxyError> {
    use axum::Router;
    use axum::middleware::from_fn_with_state;
    use axum::routing::{any, get};
    use std::sync::Arc;
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    let app_state = Arc::new(server::AppState::new(config)?);

    Ok(Router::new()
        .route("/v1/{*path}", any(server::proxy))
        .route("/health", get(server::health))
        .layer(from_fn_with_state(app_state.clone(), server::sanitize_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state))
}
