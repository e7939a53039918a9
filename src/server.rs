//!
//! HTTP server implementation for the DialectMux gateway.
//!
//! Every `/v1/*` request is forwarded to the configured upstream backend.
//! Chat request bodies are normalized on the way in by `sanitize_middleware`;
//! streamed responses are re-emitted with a single finish reason and a single
//! `[DONE]` terminator.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::sse::Event;
use axum::response::{IntoResponse, Response, Sse};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::sanitize::{RequestSanitizer, SanitizeStats, should_sanitize_path};
use crate::stream::FinishDeduplicator;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Application state shared by all handlers.
pub struct AppState {
    /** application configuration */
    pub config: Config,
    /** HTTP client for upstream requests */
    pub http_client: Client,
    /** request body sanitizer */
    pub sanitizer: RequestSanitizer,
    /** metrics for monitoring */
    pub metrics: AppMetrics,
    /** process start time, reported by /health */
    pub started_at: DateTime<Utc>,
}

///
/// Application metrics for monitoring and observability.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /** total number of proxied requests */
    pub total_requests: AtomicU64,
    /** requests answered by the upstream (any status) */
    pub successful_requests: AtomicU64,
    /** requests that failed before an upstream answer */
    pub failed_requests: AtomicU64,
    /** upstream 429 responses seen */
    pub rate_limited: AtomicU64,
    /** total number of retry attempts made */
    pub retry_attempts: AtomicU64,
    /** requests whose body was rewritten by the sanitizer */
    pub sanitized_requests: AtomicU64,
    /** fields removed or rewritten across all requests */
    pub fields_removed: AtomicU64,
    /** messages flattened across all requests */
    pub messages_flattened: AtomicU64,
    /** system instructions relocated or dropped */
    pub system_merges: AtomicU64,
    /** streamed chunks dropped or rewritten for a repeated finish reason */
    pub suppressed_finishes: AtomicU64,
}

/* --- constants ------------------------------------------------------------------------------ */

/** Channel buffer size for streaming responses */
const STREAMING_CHANNEL_BUFFER: usize = 100;

/** Base delay in milliseconds for exponential backoff */
const BASE_RETRY_DELAY_MS: u64 = 1000;

/** Bearer token prefix */
const BEARER_PREFIX: &str = "Bearer ";

/** SSE content type prefix */
const EVENT_STREAM: &str = "text/event-stream";

/** Headers that describe a single connection and must not be forwarded */
const HOP_BY_HOP_HEADERS: [&str; 10] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/* --- start of code -------------------------------------------------------------------------- */

impl AppState {
    ///
    /// Create new application state.
    ///
    /// # Arguments
    ///  * `config` - application configuration
    ///
    /// # Returns
    ///  * Application state with initialized dependencies
    ///  * `ProxyError::Http` if the HTTP client cannot be built
    pub fn new(config: Config) -> Result<Self> {
        let http_client = Self::create_http_client(&config)?;
        let sanitizer = RequestSanitizer::new(config.server.log_level);

        Ok(Self {
            config,
            http_client,
            sanitizer,
            metrics: AppMetrics::default(),
            started_at: Utc::now(),
        })
    }

    ///
    /// Create HTTP client with the configured upstream timeout.
    fn create_http_client(config: &Config) -> Result<Client> {
        Client::builder()
            .timeout(Duration::from_secs(config.upstream.timeout_secs))
            .build()
            .map_err(|e| ProxyError::Http(format!("Failed to create HTTP client: {}", e)))
    }
}

impl AppMetrics {
    /// Fold one sanitizer result into the counters
    pub fn record_sanitize(&self, stats: &SanitizeStats) {
        if !stats.is_modified() {
            return;
        }
        self.sanitized_requests.fetch_add(1, Ordering::Relaxed);
        self.fields_removed.fetch_add(stats.total_removed as u64, Ordering::Relaxed);
        self.messages_flattened.fetch_add(stats.flattened_messages as u64, Ordering::Relaxed);
        if stats.merged_system {
            self.system_merges.fetch_add(1, Ordering::Relaxed);
        }
    }
}

///
/// Normalize chat request bodies before they reach the proxy handler.
///
/// Only `POST` requests to chat-style endpoints are touched. The body is
/// read whole (up to `sanitize.max_body_bytes`), rewritten and re-attached
/// with a matching `Content-Length`.
///
/// # Arguments
///  * `state` - shared application state
///  * `request` - incoming request
///  * `next` - rest of the middleware stack
///
/// # Returns
///  * downstream response, or 413 when the body is too large to read
pub async fn sanitize_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.sanitize.enabled
        || request.method() != Method::POST
        || !should_sanitize_path(request.uri().path())
    {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let (mut parts, body) = request.into_parts();

    let bytes = match axum::body::to_bytes(body, state.config.sanitize.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Rejecting request body for {}: {}", path, e);
            return create_error_response(&ProxyError::PayloadTooLarge(format!(
                "Request body exceeds {} bytes or could not be read",
                state.config.sanitize.max_body_bytes
            )));
        }
    };

    let (sanitized, stats) = state.sanitizer.sanitize(bytes);
    state.metrics.record_sanitize(&stats);

    if stats.total_removed > 0 {
        tracing::debug!(
            "request_sanitized: path={} removed={} flattened={} merged_system={}",
            path,
            stats.total_removed,
            stats.flattened_messages,
            stats.merged_system
        );
    }

    parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(sanitized.len()));
    next.run(Request::from_parts(parts, Body::from(sanitized))).await
}

///
/// Forward any `/v1/*` request to the upstream backend.
///
/// # Arguments
///  * `state` - shared application state
///  * `request` - incoming (already sanitized) request
///
/// # Returns
///  * upstream response, SSE streams re-emitted through a `FinishDeduplicator`
///  * JSON error response on transport failure
pub async fn proxy(State(state): State<Arc<AppState>>, request: Request) -> Response {
    state.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

    match process_proxy_request(state.clone(), request).await {
        Ok(response) => {
            state.metrics.successful_requests.fetch_add(1, Ordering::Relaxed);
            response
        }
        Err(e) => {
            state.metrics.failed_requests.fetch_add(1, Ordering::Relaxed);
            tracing::error!("Proxy request failed: {}", e);
            create_error_response(&e)
        }
    }
}

///
/// Forward one request end-to-end.
async fn process_proxy_request(state: Arc<AppState>, request: Request) -> Result<Response> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, state.config.sanitize.max_body_bytes)
        .await
        .map_err(|e| ProxyError::PayloadTooLarge(format!("Failed to read request body: {}", e)))?;

    let path_and_query = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    let url = state.config.upstream_url(path_and_query);
    let headers = forwarded_headers(&parts.headers, state.config.upstream.api_key.as_deref());

    tracing::debug!("Forwarding {} {} ({} bytes)", parts.method, url, body.len());

    let upstream =
        send_with_retry(&state, parts.method.clone(), &url, headers, body).await?;

    if is_event_stream(upstream.headers()) {
        Ok(handle_streaming_response(upstream, state))
    } else {
        Ok(handle_plain_response(upstream))
    }
}

///
/// Send a request upstream, retrying on 429 with exponential backoff.
///
/// # Arguments
///  * `state` - application state with HTTP client and config
///  * `method` - request method
///  * `url` - absolute upstream URL
///  * `headers` - already filtered request headers
///  * `body` - request body
///
/// # Returns
///  * the final upstream response, which may itself be a 429
///  * `ProxyError` on transport failure
async fn send_with_retry(
    state: &AppState,
    method: Method,
    url: &str,
    headers: HeaderMap,
    body: Bytes,
) -> Result<reqwest::Response> {
    let upstream = &state.config.upstream;
    let max_attempts = if upstream.enable_retries { upstream.max_retry_attempts.max(1) } else { 1 };
    let mut attempts = 0;

    loop {
        attempts += 1;
        let response = state
            .http_client
            .request(method.clone(), url)
            .headers(headers.clone())
            .body(body.clone())
            .send()
            .await
            .map_err(map_transport_error)?;

        if response.status() != StatusCode::TOO_MANY_REQUESTS {
            return Ok(response);
        }

        state.metrics.rate_limited.fetch_add(1, Ordering::Relaxed);
        if attempts >= max_attempts {
            tracing::warn!("Upstream rate limited, giving up after {} attempt(s)", attempts);
            return Ok(response);
        }

        state.metrics.retry_attempts.fetch_add(1, Ordering::Relaxed);
        let delay = retry_delay(attempts);
        tracing::warn!(
            "Upstream rate limited, retrying in {} ms (attempt {}/{}) - Total retries: {}",
            delay.as_millis(),
            attempts,
            max_attempts,
            state.metrics.retry_attempts.load(Ordering::Relaxed)
        );
        tokio::time::sleep(delay).await;
    }
}

/// Backoff before the next attempt, doubling per attempt
fn retry_delay(attempt: u32) -> Duration {
    Duration::from_millis(BASE_RETRY_DELAY_MS.saturating_mul(1_u64 << attempt.saturating_sub(1).min(16)))
}

/// Timeouts become 504, everything else 502
fn map_transport_error(error: reqwest::Error) -> ProxyError {
    if error.is_timeout() {
        ProxyError::Timeout(format!("Upstream did not answer in time: {}", error))
    } else {
        ProxyError::Request(error)
    }
}

///
/// Copy client headers for the upstream request.
///
/// Hop-by-hop headers are dropped. When the client sent no `Authorization`
/// and an API key is configured, a bearer token is attached.
///
/// # Arguments
///  * `incoming` - client request headers
///  * `api_key` - configured upstream key
///
/// # Returns
///  * headers to send upstream
fn forwarded_headers(incoming: &HeaderMap, api_key: Option<&str>) -> HeaderMap {
    let mut headers = filter_hop_by_hop(incoming);

    if !headers.contains_key(header::AUTHORIZATION) {
        if let Some(key) = api_key {
            match HeaderValue::from_str(&format!("{}{}", BEARER_PREFIX, key)) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(header::AUTHORIZATION, value);
                }
                Err(e) => tracing::warn!("Configured API key is not a valid header value: {}", e),
            }
        }
    }

    headers
}

fn filter_hop_by_hop(incoming: &HeaderMap) -> HeaderMap {
    incoming
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(EVENT_STREAM))
}

///
/// Pass a non-streaming upstream response through unchanged.
///
/// # Arguments
///  * `upstream` - upstream response
///
/// # Returns
///  * response with upstream status, headers and body
fn handle_plain_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let headers = filter_hop_by_hop(upstream.headers());

    let mut response = Body::from_stream(upstream.bytes_stream()).into_response();
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

///
/// Re-emit an upstream SSE stream.
///
/// Each `data:` payload goes through a per-stream `FinishDeduplicator`, and
/// the stream is closed with exactly one `[DONE]`.
///
/// # Arguments
///  * `upstream` - streaming upstream response
///  * `state` - application state
///
/// # Returns
///  * Server-Sent Events response
fn handle_streaming_response(upstream: reqwest::Response, state: Arc<AppState>) -> Response {
    let status = upstream.status();
    let dedup = if state.config.streaming.dedupe_finish {
        FinishDeduplicator::new()
    } else {
        FinishDeduplicator::passthrough()
    };

    let (tx, rx) = mpsc::channel::<Result<Event>>(STREAMING_CHANNEL_BUFFER);

    tokio::spawn(async move {
        process_streaming_events(upstream, state, dedup, tx).await;
    });

    (status, Sse::new(ReceiverStream::new(rx))).into_response()
}

///
/// Pump upstream SSE lines through the deduplicator into the client channel.
///
/// # Arguments
///  * `upstream` - streaming upstream response
///  * `state` - application state for metrics
///  * `dedup` - deduplicator owned by this stream
///  * `tx` - channel sender for streaming events
async fn process_streaming_events(
    upstream: reqwest::Response,
    state: Arc<AppState>,
    mut dedup: FinishDeduplicator,
    tx: mpsc::Sender<Result<Event>>,
) {
    let mut stream = std::pin::pin!(upstream.bytes_stream());
    let mut pending: Vec<u8> = Vec::new();

    while let Some(chunk_result) = stream.next().await {
        match chunk_result {
            Ok(chunk) => {
                pending.extend_from_slice(&chunk);
                for line in take_complete_lines(&mut pending) {
                    if !forward_sse_line(&line, &mut dedup, &tx).await {
                        record_stream_end(&state, &dedup);
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::error!("Stream chunk error: {}", e);
                break;
            }
        }
    }

    if !pending.is_empty() {
        let rest = String::from_utf8_lossy(&pending).into_owned();
        forward_sse_line(rest.trim_end_matches(['\r', '\n']), &mut dedup, &tx).await;
    }
    if let Some(done) = dedup.done() {
        send_sse_event(&tx, done).await;
    }
    record_stream_end(&state, &dedup);
}

///
/// Forward one SSE line, returning false once the client has gone away.
async fn forward_sse_line(
    line: &str,
    dedup: &mut FinishDeduplicator,
    tx: &mpsc::Sender<Result<Event>>,
) -> bool {
    let Some(data) = extract_sse_data(line) else {
        return true;
    };
    match dedup.observe_data(data) {
        Some(payload) => send_sse_event(tx, &payload).await,
        None => true,
    }
}

fn record_stream_end(state: &AppState, dedup: &FinishDeduplicator) {
    let suppressed = dedup.suppressed() as u64;
    if suppressed > 0 {
        state.metrics.suppressed_finishes.fetch_add(suppressed, Ordering::Relaxed);
    }
    tracing::debug!(
        "Stream closed: finish_reason={:?} suppressed={}",
        dedup.finish_reason(),
        suppressed
    );
}

///
/// Take every complete line out of the pending byte buffer.
///
/// Lines end with `\r\n`, `\n` or a bare `\r`. A `\r` as the last buffered
/// byte stays pending until the next byte shows whether a `\n` follows it.
/// Line terminators never occur inside a multi-byte UTF-8 sequence, so every
/// returned line decodes whole.
///
/// # Arguments
///  * `pending` - bytes received but not yet forwarded
///
/// # Returns
///  * complete lines without their terminators, possibly none
fn take_complete_lines(pending: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut pos = 0;

    while pos < pending.len() {
        let terminator = match (pending[pos], pending.get(pos + 1).copied()) {
            (b'\n', _) => 1,
            (b'\r', Some(b'\n')) => 2,
            (b'\r', Some(_)) => 1,
            (b'\r', None) => break,
            _ => {
                pos += 1;
                continue;
            }
        };
        lines.push(String::from_utf8_lossy(&pending[start..pos]).into_owned());
        pos += terminator;
        start = pos;
    }

    pending.drain(..start);
    lines
}

///
/// Extract data from SSE line if it's a data event.
///
/// # Arguments
///  * `line` - SSE line to process
///
/// # Returns
///  * Some(data) if line contains data event, None otherwise
fn extract_sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data))
}

///
/// Send an SSE event through the channel.
///
/// # Returns
///  * false when the receiving side is closed
async fn send_sse_event(tx: &mpsc::Sender<Result<Event>>, data: &str) -> bool {
    tx.send(Ok(Event::default().data(data))).await.is_ok()
}

///
/// Create an error response for proxy failures.
///
/// # Arguments
///  * `error` - error to convert to HTTP response
///
/// # Returns
///  * HTTP error response with JSON error details
pub fn create_error_response(error: &ProxyError) -> Response {
    let (status_code, error_type) = match error {
        ProxyError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "invalid_request_error"),
        ProxyError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout"),
        ProxyError::Request(e) if e.is_timeout() => {
            (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout")
        }
        ProxyError::Request(_) | ProxyError::Http(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
        ProxyError::Config(_) | ProxyError::Serialization(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    };

    let error_response = json!({
      "error": {
        "message": error.to_string(),
        "type": error_type,
        "code": status_code.as_u16()
      }
    });

    (status_code, Json(error_response)).into_response()
}

///
/// Handle health check endpoint.
///
/// # Arguments
///  * `state` - shared application state with metrics
///
/// # Returns
///  * JSON response with health status, uptime and counters
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let metrics = &state.metrics;
    let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
    let uptime = Utc::now().signed_duration_since(state.started_at);

    Json(json!({
      "status": "ok",
      "version": env!("CARGO_PKG_VERSION"),
      "started_at": state.started_at.to_rfc3339(),
      "uptime_secs": uptime.num_seconds(),
      "upstream": state.config.upstream.base_url,
      "metrics": {
        "total_requests": load(&metrics.total_requests),
        "successful_requests": load(&metrics.successful_requests),
        "failed_requests": load(&metrics.failed_requests),
        "rate_limited": load(&metrics.rate_limited),
        "retry_attempts": load(&metrics.retry_attempts),
        "sanitized_requests": load(&metrics.sanitized_requests),
        "fields_removed": load(&metrics.fields_removed),
        "messages_flattened": load(&metrics.messages_flattened),
        "system_merges": load(&metrics.system_merges),
        "suppressed_finishes": load(&metrics.suppressed_finishes)
      }
    }))
}

/* --- tests ----------------------------------------------------------------------------------- */
