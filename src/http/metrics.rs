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

//! Prometheus metrics (§9 "Metrics"): `/metrics` serves the process-wide
//! default registry in text exposition format.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use once_cell::sync::Lazy;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, Opts, TextEncoder};

use crate::http::state::AppState;

pub static CHECKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("policyshield_checks_total", "Total number of /check calls by verdict.");
    let metric = IntCounterVec::new(opts, &["verdict"]).expect("valid metric definition");
    prometheus::register(Box::new(metric.clone())).expect("metric registers once");
    metric
});

pub static APPROVALS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("policyshield_approvals_total", "Total number of approval resolutions by outcome.");
    let metric = IntCounterVec::new(opts, &["outcome"]).expect("valid metric definition");
    prometheus::register(Box::new(metric.clone())).expect("metric registers once");
    metric
});

pub static RATE_LIMIT_DENIALS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let metric = IntCounter::new("policyshield_rate_limit_denials_total", "Total calls rejected by the rate limiter.")
        .expect("valid metric definition");
    prometheus::register(Box::new(metric.clone())).expect("metric registers once");
    metric
});

pub static TRACE_WRITE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let metric = IntCounter::new("policyshield_trace_write_failures_total", "Total trace-file write failures.")
        .expect("valid metric definition");
    prometheus::register(Box::new(metric.clone())).expect("metric registers once");
    metric
});

pub static PENDING_APPROVALS: Lazy<Gauge> = Lazy::new(|| {
    let metric = Gauge::new("policyshield_pending_approvals", "Current number of approvals awaiting a response.")
        .expect("valid metric definition");
    prometheus::register(Box::new(metric.clone())).expect("metric registers once");
    metric
});

pub static SESSIONS_ACTIVE: Lazy<Gauge> = Lazy::new(|| {
    let metric = Gauge::new("policyshield_sessions_active", "Current number of live sessions in the store.")
        .expect("valid metric definition");
    prometheus::register(Box::new(metric.clone())).expect("metric registers once");
    metric
});

pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    SESSIONS_ACTIVE.set(state.engine.sessions().active_sessions() as f64);
    PENDING_APPROVALS.set(state.engine.pending_approvals().len() as f64);

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }
    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer).into_response()
}
