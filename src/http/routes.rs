// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP endpoint handlers and router assembly (§6.1 "HTTP endpoints (wire)").

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::engine::CheckRequest;
use crate::http::auth::bearer_auth;
use crate::http::error_mapping::ApiError;
use crate::http::idempotency::CachedResponse;
use crate::http::limits::{admission_control, require_json_content_type};
use crate::http::metrics::{self, APPROVALS_TOTAL, CHECKS_TOTAL, RATE_LIMIT_DENIALS_TOTAL};
use crate::http::state::AppState;
use crate::verdict::CheckResult;

const IDEMPOTENCY_HEADER: &str = "x-idempotency-key";

// ---------------------------------------------------------------------
// /api/v1/check
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CheckRequestBody {
    pub tool_name: String,
    pub args: serde_json::Value,
    pub session_id: Option<String>,
    pub sender: Option<String>,
    #[serde(default)]
    pub context: std::collections::HashMap<String, String>,
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckResponseBody {
    pub verdict: crate::types::Verdict,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_args: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pii_types: Vec<crate::types::PiiType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
    pub request_id: String,
}

impl CheckResponseBody {
    fn from_result(result: CheckResult, request_id: String) -> Self {
        Self {
            verdict: result.verdict,
            message: result.message,
            rule_id: result.rule_id,
            modified_args: result.modified_args,
            pii_types: result.pii_types,
            approval_id: result.approval_id,
            request_id,
        }
    }
}

async fn check(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(body): Json<CheckRequestBody>,
) -> Result<axum::response::Response, ApiError> {
    if body.tool_name.trim().is_empty() {
        return Err(ApiError::validation("tool_name must not be empty"));
    }

    let idempotency_key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    if let Some(key) = &idempotency_key {
        if let Some(cached) = state.idempotency.get(key) {
            let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
            return Ok((status, cached.body).into_response());
        }
    }

    if state.engine.is_killed() {
        return Err(ApiError::killed("kill-switch is active; all calls are blocked").with_retry_after(1));
    }

    let req = CheckRequest {
        tool_name: body.tool_name,
        args: body.args,
        session_id: body.session_id,
        sender: body.sender,
        context: body.context,
        request_id: body.request_id,
    };
    let request_id = req
        .request_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let result = state.engine.check(req).await;
    CHECKS_TOTAL.with_label_values(&[&result.verdict.to_string()]).inc();
    if result.rule_id.as_deref() == Some(crate::verdict::RATE_LIMIT_RULE_ID) {
        RATE_LIMIT_DENIALS_TOTAL.inc();
    }
    if result.approval_id.is_some() {
        let outcome = match result.verdict {
            crate::types::Verdict::Allow => "approved",
            _ => "denied_or_timed_out",
        };
        APPROVALS_TOTAL.with_label_values(&[outcome]).inc();
    }

    let body = CheckResponseBody::from_result(result, request_id);
    let bytes = serde_json::to_vec(&body).map_err(|e| ApiError::internal(e.to_string()))?;

    if let Some(key) = idempotency_key {
        state.idempotency.put(
            key,
            CachedResponse {
                status: StatusCode::OK.as_u16(),
                body: bytes.clone(),
            },
        );
    }

    Ok(([(axum::http::header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

// ---------------------------------------------------------------------
// /api/v1/post-check
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PostCheckRequestBody {
    pub tool_name: String,
    #[serde(default)]
    pub args: serde_json::Value,
    pub result: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PostCheckResponseBody {
    pub pii_types: Vec<crate::types::PiiType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redacted_output: Option<String>,
}

async fn post_check(
    State(state): State<AppState>,
    Json(body): Json<PostCheckRequestBody>,
) -> Result<Json<PostCheckResponseBody>, ApiError> {
    let session_id = body.session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let (pii_types, redacted_output) = state.engine.post_check(&body.tool_name, &body.result, &session_id).await;
    Ok(Json(PostCheckResponseBody { pii_types, redacted_output }))
}

// ---------------------------------------------------------------------
// /api/v1/check-approval
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CheckApprovalRequestBody {
    pub approval_id: String,
}

#[derive(Debug, Serialize)]
pub struct CheckApprovalResponseBody {
    pub approval_id: String,
    pub status: crate::approval::ApprovalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

async fn check_approval(
    State(state): State<AppState>,
    Json(body): Json<CheckApprovalRequestBody>,
) -> Result<Json<CheckApprovalResponseBody>, ApiError> {
    let record = state
        .engine
        .approval_status(&body.approval_id)
        .ok_or_else(|| ApiError::not_found("no such approval request"))?;
    Ok(Json(CheckApprovalResponseBody {
        approval_id: body.approval_id,
        status: record.status,
        responder: record.responder,
        comment: record.comment,
    }))
}

// ---------------------------------------------------------------------
// /api/v1/respond-approval
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RespondApprovalRequestBody {
    pub approval_id: String,
    pub approved: bool,
    pub responder: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OkResponseBody {
    pub ok: bool,
}

async fn respond_approval(
    State(state): State<AppState>,
    Json(body): Json<RespondApprovalRequestBody>,
) -> Result<Json<OkResponseBody>, ApiError> {
    let accepted = state
        .engine
        .respond_approval(&body.approval_id, body.approved, body.responder, body.comment);
    if !accepted {
        return Err(ApiError::not_found("approval request is unknown or already resolved"));
    }
    Ok(Json(OkResponseBody { ok: true }))
}

// ---------------------------------------------------------------------
// /api/v1/pending-approvals
// ---------------------------------------------------------------------

async fn pending_approvals(State(state): State<AppState>) -> Json<Vec<crate::approval::ApprovalRequest>> {
    Json(state.engine.pending_approvals())
}

// ---------------------------------------------------------------------
// /api/v1/reload
// ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ReloadResponseBody {
    pub rules_count: usize,
    pub hash: String,
    pub reloaded_at: chrono::DateTime<chrono::Utc>,
}

async fn reload(State(state): State<AppState>) -> Result<Json<ReloadResponseBody>, ApiError> {
    let ruleset = state.engine.reload(&state.config.rules_path).await?;
    Ok(Json(ReloadResponseBody {
        rules_count: ruleset.rules_count(),
        hash: ruleset.content_hash.clone(),
        reloaded_at: chrono::Utc::now(),
    }))
}

// ---------------------------------------------------------------------
// /api/v1/kill, /api/v1/resume
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct KillRequestBody {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponseBody {
    pub status: &'static str,
}

async fn kill(
    State(state): State<AppState>,
    Json(body): Json<KillRequestBody>,
) -> Json<StatusResponseBody> {
    tracing::warn!(reason = body.reason.as_deref().unwrap_or("unspecified"), "kill switch engaged");
    state.engine.kill();
    Json(StatusResponseBody { status: "killed" })
}

async fn resume(State(state): State<AppState>) -> Json<StatusResponseBody> {
    state.engine.resume();
    Json(StatusResponseBody { status: "resumed" })
}

// ---------------------------------------------------------------------
// /api/v1/clear-taint
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ClearTaintRequestBody {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ClearTaintResponseBody {
    pub ok: bool,
    pub session_id: String,
}

async fn clear_taint(
    State(state): State<AppState>,
    Json(body): Json<ClearTaintRequestBody>,
) -> Json<ClearTaintResponseBody> {
    let ok = state.engine.clear_taint(&body.session_id);
    Json(ClearTaintResponseBody { ok, session_id: body.session_id })
}

// ---------------------------------------------------------------------
// /api/v1/constraints
// ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ConstraintsResponseBody {
    pub summary: String,
}

async fn constraints(State(state): State<AppState>) -> Json<ConstraintsResponseBody> {
    let ruleset = state.engine.ruleset().await;
    let mut lines = vec![format!(
        "{} v{} — {} active rule(s), default verdict {}.",
        ruleset.shield_name,
        ruleset.version,
        ruleset.rules_count(),
        ruleset.default_verdict
    )];
    for rule in ruleset.rules.iter().filter(|r| r.enabled) {
        let description = rule.description.as_deref().unwrap_or("(no description)");
        lines.push(format!("- {} → {}: {}", rule.id, rule.verdict, description));
    }
    Json(ConstraintsResponseBody { summary: lines.join("\n") })
}

// ---------------------------------------------------------------------
// /api/v1/health, /api/v1/livez, /api/v1/readyz
// ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponseBody {
    pub status: &'static str,
    pub shield_name: String,
    pub version: String,
    pub mode: crate::types::Mode,
    pub rules_count: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponseBody> {
    let ruleset = state.engine.ruleset().await;
    Json(HealthResponseBody {
        status: if state.engine.is_killed() { "killed" } else { "ok" },
        shield_name: ruleset.shield_name.clone(),
        version: ruleset.version.clone(),
        mode: state.engine.mode().await,
        rules_count: ruleset.rules_count(),
    })
}

#[derive(Debug, Serialize)]
pub struct ReadyzResponseBody {
    pub ready: bool,
    pub checks: std::collections::HashMap<String, bool>,
}

async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<ReadyzResponseBody>) {
    let mut checks = std::collections::HashMap::new();
    let engine_ok = state.engine.health().await.is_ok();
    checks.insert("engine".to_string(), engine_ok);
    checks.insert("not_killed".to_string(), !state.engine.is_killed());

    let ready = checks.values().all(|v| *v);
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(ReadyzResponseBody { ready, checks }))
}

// ---------------------------------------------------------------------
// Router assembly — mirrors the layered tower stack pattern (route-scoped
// `from_fn_with_state` plus a shared `ServiceBuilder` stack).
// ---------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .allow_origin(cors_origins(&state.config.cors_origins));

    let request_timeout = state.config.request_timeout;

    let admin_routes = Router::new()
        .route("/api/v1/reload", post(reload))
        .route("/api/v1/kill", post(kill))
        .route("/api/v1/resume", post(resume))
        .route("/api/v1/respond-approval", post(respond_approval));

    let app_routes = Router::new()
        .route("/api/v1/check", post(check))
        .route("/api/v1/post-check", post(post_check))
        .route("/api/v1/check-approval", post(check_approval))
        .route("/api/v1/pending-approvals", get(pending_approvals))
        .route("/api/v1/clear-taint", post(clear_taint))
        .route("/api/v1/constraints", get(constraints))
        .merge(admin_routes)
        .layer(axum::middleware::from_fn_with_state(state.clone(), bearer_auth))
        .layer(axum::middleware::from_fn(require_json_content_type))
        .layer(axum::middleware::from_fn_with_state(state.clone(), admission_control));

    let public_routes = Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/livez", get(health))
        .route("/api/v1/readyz", get(readyz))
        .route("/metrics", get(metrics::metrics_handler));

    Router::new()
        .merge(app_routes)
        .merge(public_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(RequestBodyLimitLayer::new(state.config.max_request_size_bytes))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

fn cors_origins(origins: &[String]) -> tower_http::cors::AllowOrigin {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        tower_http::cors::AllowOrigin::any()
    } else {
        let parsed: Vec<axum::http::HeaderValue> = origins
            .iter()
            .filter_map(|o| axum::http::HeaderValue::from_str(o).ok())
            .collect();
        tower_http::cors::AllowOrigin::list(parsed)
    }
}

/// Builds a `SocketAddr`-aware service so [`crate::http::auth::bearer_auth`]
/// can recover the peer IP for lockout/rate-limit bookkeeping (§4.11).
pub fn into_make_service(
    router: Router,
) -> axum::serve::IntoMakeServiceWithConnectInfo<Router, SocketAddr> {
    router.into_make_service_with_connect_info::<SocketAddr>()
}
