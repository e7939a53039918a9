//! Integration tests for DialectMux HTTP endpoints
//!
//! Runs the full router against a mock upstream bound to a local port and
//! checks what the upstream receives and what the client gets back.

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use dialectmux::config::Config;
use serde_json::{Value, json};
use tower::ServiceExt;

const SSE_BODY: &str = concat!(
    "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"hi\"},\"finish_reason\":null}]}\n\n",
    "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
    "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
    "data: [DONE]\n\n",
    "data: [DONE]\n\n",
);

const SSE_BODY_CR: &str = concat!(
    "data: {\"id\":\"c2\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"a\"},\"finish_reason\":null}]}\r\r",
    "data: {\"id\":\"c2\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\r\r",
    "data: {\"id\":\"c2\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\r\r",
    "data: [DONE]\r\r",
);

/// Echo the received body and authorization header back as JSON
async fn echo(headers: HeaderMap, body: Bytes) -> Response {
    let received: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let authorization =
        headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()).map(str::to_string);
    axum::Json(json!({"received": received, "authorization": authorization})).into_response()
}

async fn stream() -> Response {
    ([(header::CONTENT_TYPE, "text/event-stream")], SSE_BODY).into_response()
}

async fn stream_cr() -> Response {
    ([(header::CONTENT_TYPE, "text/event-stream")], SSE_BODY_CR).into_response()
}

async fn rate_limited() -> Response {
    (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response()
}

/// Start a mock upstream and return its base URL
async fn spawn_upstream() -> String {
    let app = Router::new()
        .route("/v1/stream/chat/completions", post(stream))
        .route("/v1/stream-cr/chat/completions", post(stream_cr))
        .route("/v1/limited/chat/completions", post(rate_limited))
        .route("/v1/models", get(|| async { axum::Json(json!({"data": []})) }))
        .route("/v1/{*path}", post(echo));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn test_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.upstream.base_url = base_url.to_string();
    config.upstream.api_key = Some("sk-test".to_string());
    config.upstream.timeout_secs = 5;
    config
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Test that the health endpoint reports status and counters
#[tokio::test]
async fn test_health_endpoint() {
    let app = dialectmux::create_app(test_config("http://127.0.0.1:9")).unwrap();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["metrics"]["total_requests"], 0);
    assert!(health["uptime_secs"].is_i64());
}

/// Test that chat requests reach the upstream normalized, with the API key attached
#[tokio::test]
async fn test_chat_request_is_sanitized_before_forwarding() {
    let base_url = spawn_upstream().await;
    let app = dialectmux::create_app(test_config(&base_url)).unwrap();

    let request = json!({
        "model": "claude-sonnet",
        "metadata": {"user_id": "u1"},
        "tool_choice": {"type": "any"},
        "messages": [
            {"role": "user", "content": [{"type": "text", "text": "weather?", "cache_control": {"type": "ephemeral"}}]},
            {"role": "assistant", "content": [
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Oslo"}}
            ]},
            {"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "toolu_1", "content": "sunny"}
            ]}
        ]
    });

    let response =
        app.oneshot(post_json("/v1/chat/completions", &request.to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let echoed = body_json(response).await;
    assert_eq!(echoed["authorization"], "Bearer sk-test");
    assert_eq!(
        echoed["received"],
        json!({
            "model": "claude-sonnet",
            "tool_choice": "auto",
            "messages": [
                {"role": "user", "content": "weather?"},
                {"role": "assistant", "content": " ", "tool_calls": [{
                    "id": "toolu_1",
                    "type": "function",
                    "function": {"name": "get_weather", "arguments": "{\"city\":\"Oslo\"}"}
                }]},
                {"role": "tool", "tool_call_id": "toolu_1", "content": "sunny"}
            ]
        })
    );
}

/// Test that the client's own Authorization header is forwarded untouched
#[tokio::test]
async fn test_client_authorization_is_kept() {
    let base_url = spawn_upstream().await;
    let app = dialectmux::create_app(test_config(&base_url)).unwrap();

    let mut request = post_json("/v1/chat/completions", r#"{"model":"m"}"#);
    request.headers_mut().insert(header::AUTHORIZATION, "Bearer client-key".parse().unwrap());

    let echoed = body_json(app.oneshot(request).await.unwrap()).await;
    assert_eq!(echoed["authorization"], "Bearer client-key");
    assert_eq!(echoed["received"], json!({"model": "m"}));
}

/// Test that non-chat endpoints and a disabled sanitizer leave bodies alone
#[tokio::test]
async fn test_bodies_untouched_outside_chat_endpoints() {
    let base_url = spawn_upstream().await;
    let body = r#"{"input":"x","metadata":{"a":1}}"#;

    let app = dialectmux::create_app(test_config(&base_url)).unwrap();
    let echoed = body_json(app.oneshot(post_json("/v1/embeddings", body)).await.unwrap()).await;
    assert_eq!(echoed["received"]["metadata"], json!({"a": 1}));

    let mut config = test_config(&base_url);
    config.sanitize.enabled = false;
    let app = dialectmux::create_app(config).unwrap();
    let echoed =
        body_json(app.oneshot(post_json("/v1/chat/completions", body)).await.unwrap()).await;
    assert_eq!(echoed["received"]["metadata"], json!({"a": 1}));
}

/// Test that GET requests are proxied too
#[tokio::test]
async fn test_get_is_proxied() {
    let base_url = spawn_upstream().await;
    let app = dialectmux::create_app(test_config(&base_url)).unwrap();

    let response = app
        .oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"data": []}));
}

/// Test that a streamed response keeps one finish reason and one [DONE]
#[tokio::test]
async fn test_stream_finish_reason_deduplicated() {
    let base_url = spawn_upstream().await;
    let app = dialectmux::create_app(test_config(&base_url)).unwrap();

    let response = app
        .oneshot(post_json("/v1/stream/chat/completions", r#"{"model":"m","stream":true}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/event-stream")
    );

    let text = body_text(response).await;
    assert_eq!(text.matches("[DONE]").count(), 1, "got: {}", text);
    assert!(text.trim_end().ends_with("data: [DONE]"), "got: {}", text);
    assert!(text.contains("\"finish_reason\":\"tool_calls\""), "got: {}", text);
    assert!(!text.contains("\"stop\""), "got: {}", text);
    assert!(text.contains("\"content\":\"hi\""), "got: {}", text);
}

/// Test that an upstream ending SSE lines with bare CR is split and deduplicated
#[tokio::test]
async fn test_stream_with_carriage_return_line_endings() {
    let base_url = spawn_upstream().await;
    let app = dialectmux::create_app(test_config(&base_url)).unwrap();

    let response = app
        .oneshot(post_json("/v1/stream-cr/chat/completions", r#"{"model":"m","stream":true}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let text = body_text(response).await;
    assert_eq!(text.matches("[DONE]").count(), 1, "got: {:?}", text);
    assert!(!text.contains('\r'), "got: {:?}", text);
    assert_eq!(text.matches("data: {").count(), 2, "got: {:?}", text);
    assert!(text.contains("\"content\":\"a\""), "got: {:?}", text);
    assert!(text.contains("\"finish_reason\":\"tool_calls\""), "got: {:?}", text);
    assert!(!text.contains("\"stop\""), "got: {:?}", text);
}

/// Test that with dedupe off every finish reason passes but [DONE] is still single
#[tokio::test]
async fn test_stream_passthrough_when_dedupe_disabled() {
    let base_url = spawn_upstream().await;
    let mut config = test_config(&base_url);
    config.streaming.dedupe_finish = false;
    let app = dialectmux::create_app(config).unwrap();

    let response = app
        .oneshot(post_json("/v1/stream/chat/completions", r#"{"model":"m","stream":true}"#))
        .await
        .unwrap();

    let text = body_text(response).await;
    assert_eq!(text.matches("[DONE]").count(), 1, "got: {}", text);
    assert!(text.contains("\"finish_reason\":\"stop\""), "got: {}", text);
}

/// Test that oversized chat bodies are rejected with 413
#[tokio::test]
async fn test_oversized_body_rejected() {
    let mut config = test_config("http://127.0.0.1:9");
    config.sanitize.max_body_bytes = 1024;
    let app = dialectmux::create_app(config).unwrap();

    let body = format!(r#"{{"model":"m","pad":"{}"}}"#, "x".repeat(4096));
    let response = app.oneshot(post_json("/v1/chat/completions", &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let error = body_json(response).await;
    assert_eq!(error["error"]["type"], "invalid_request_error");
    assert_eq!(error["error"]["code"], 413);
}

/// Test that an unreachable upstream maps to 502
#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let app = dialectmux::create_app(test_config(&base_url)).unwrap();
    let response = app.oneshot(post_json("/v1/chat/completions", r#"{"model":"m"}"#)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["error"]["type"], "upstream_error");
}

/// Test that 429 is passed through when retries are disabled
#[tokio::test]
async fn test_rate_limit_passed_through_without_retries() {
    let base_url = spawn_upstream().await;
    let mut config = test_config(&base_url);
    config.upstream.enable_retries = false;
    let app = dialectmux::create_app(config).unwrap();

    let response = app
        .oneshot(post_json("/v1/limited/chat/completions", r#"{"model":"m"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_text(response).await, "slow down");
}
