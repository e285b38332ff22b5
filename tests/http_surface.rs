//! Integration tests for the HTTP surface (§6.1): real `axum::Router`
//! requests driven through `tower::ServiceExt::oneshot`, no listening socket.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use policyshield::config::Config;
use policyshield::engine::{ShieldEngine, ShieldEngineConfig};
use policyshield::http::{build_router, AppState};
use policyshield::rules::compiler;
use policyshield::trace::TraceConfig;

const RULES: &str = r#"
shield_name: http-shield
version: "1"
default_verdict: allow
rules:
  - id: no-rm
    when:
      tool: exec
      args_match:
        command: { regex: "rm\\s+-rf" }
    then: block
    message: "destructive"
"#;

fn test_state(api_token: Option<&str>, admin_token: Option<&str>) -> AppState {
    let ruleset = compiler::compile_str(RULES).expect("rule-set must compile");
    let engine = Arc::new(ShieldEngine::new(
        ruleset,
        ShieldEngineConfig::default(),
        TraceConfig::default(),
        None,
    ));
    let config = Arc::new(Config {
        api_token: api_token.map(str::to_string),
        admin_token: admin_token.map(str::to_string),
        ..Config::default()
    });
    AppState::new(engine, config)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn health_endpoint_requires_no_auth() {
    let state = test_state(Some("secret"), None);
    let app = build_router(state);

    let request = Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["status"], "ok");
}

#[tokio::test]
async fn metrics_endpoint_is_public_and_returns_text() {
    let state = test_state(Some("secret"), None);
    let app = build_router(state);

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn check_without_bearer_token_is_rejected_when_token_configured() {
    let state = test_state(Some("secret"), None);
    let app = build_router(state);

    let request = json_request("POST", "/api/v1/check", serde_json::json!({
        "tool_name": "exec",
        "args": {"command": "ls"},
        "session_id": "s1",
    }), None);

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn check_with_wrong_bearer_token_is_forbidden() {
    let state = test_state(Some("secret"), None);
    let app = build_router(state);

    let request = json_request("POST", "/api/v1/check", serde_json::json!({
        "tool_name": "exec",
        "args": {"command": "ls"},
        "session_id": "s1",
    }), Some("wrong"));

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn check_with_correct_bearer_token_returns_verdict() {
    let state = test_state(Some("secret"), None);
    let app = build_router(state);

    let request = json_request("POST", "/api/v1/check", serde_json::json!({
        "tool_name": "exec",
        "args": {"command": "rm -rf /"},
        "session_id": "s1",
    }), Some("secret"));

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["verdict"], "BLOCK");
    assert_eq!(parsed["rule_id"], "no-rm");
}

#[tokio::test]
async fn check_rejects_empty_tool_name_with_422() {
    let state = test_state(None, None);
    let app = build_router(state);

    let request = json_request("POST", "/api/v1/check", serde_json::json!({
        "tool_name": "",
        "args": {},
        "session_id": "s1",
    }), None);

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn idempotency_key_replays_the_first_response_byte_for_byte() {
    let state = test_state(None, None);
    let app = build_router(state);

    let request = |key: &str| {
        let mut req = json_request("POST", "/api/v1/check", serde_json::json!({
            "tool_name": "exec",
            "args": {"command": "rm -rf /"},
            "session_id": "s1",
        }), None);
        req.headers_mut().insert("x-idempotency-key", key.parse().unwrap());
        req
    };

    let first = app.clone().oneshot(request("dedupe-1")).await.unwrap();
    let first_body = axum::body::to_bytes(first.into_body(), usize::MAX).await.unwrap();

    let second = app.oneshot(request("dedupe-1")).await.unwrap();
    let second_body = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();

    assert_eq!(first_body, second_body);
}

#[tokio::test]
async fn admin_endpoints_require_the_admin_token_not_the_api_token() {
    let state = test_state(Some("api-secret"), Some("admin-secret"));
    let app = build_router(state);

    let request = json_request("POST", "/api/v1/kill", serde_json::json!({}), Some("api-secret"));
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let request = json_request("POST", "/api/v1/kill", serde_json::json!({}), Some("admin-secret"));
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn kill_switch_blocks_subsequent_checks_until_resumed() {
    let state = test_state(None, None);
    let app = build_router(state);

    let kill = Request::builder()
        .method("POST")
        .uri("/api/v1/kill")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.clone().oneshot(kill).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let check = json_request("POST", "/api/v1/check", serde_json::json!({
        "tool_name": "exec",
        "args": {"command": "ls"},
        "session_id": "s1",
    }), None);
    let response = app.clone().oneshot(check).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let resume = Request::builder()
        .method("POST")
        .uri("/api/v1/resume")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.clone().oneshot(resume).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let check = json_request("POST", "/api/v1/check", serde_json::json!({
        "tool_name": "exec",
        "args": {"command": "ls"},
        "session_id": "s1",
    }), None);
    let response = app.oneshot(check).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let state = test_state(None, None);
    let app = build_router(state);

    let request = Request::builder().uri("/api/v1/nonexistent").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
