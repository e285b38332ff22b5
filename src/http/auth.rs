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

//! Bearer-token auth middleware (§4.11): optional `api_token`/`admin_token`
//! tiers, per-IP auth-failure lockout, per-IP admin rate limiting.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use tracing::warn;

use crate::constants::defaults;
use crate::http::error_mapping::ApiError;
use crate::http::state::AppState;

const PUBLIC_PATHS: &[&str] = &[
    "/api/v1/health",
    "/api/v1/livez",
    "/api/v1/readyz",
    "/metrics",
];

const ADMIN_PATHS: &[&str] = &[
    "/api/v1/reload",
    "/api/v1/kill",
    "/api/v1/resume",
    "/api/v1/respond-approval",
];

struct FailWindow {
    timestamps: VecDeque<Instant>,
    locked_until: Option<Instant>,
}

struct AdminWindow {
    timestamps: VecDeque<Instant>,
}

pub struct AuthGuard {
    api_token: Option<String>,
    admin_token: Option<String>,
    auth_fail: Mutex<HashMap<IpAddr, FailWindow>>,
    admin_calls: Mutex<HashMap<IpAddr, AdminWindow>>,
}

impl AuthGuard {
    pub fn new(api_token: Option<String>, admin_token: Option<String>) -> Self {
        Self {
            api_token,
            admin_token,
            auth_fail: Mutex::new(HashMap::new()),
            admin_calls: Mutex::new(HashMap::new()),
        }
    }

    fn is_locked_out(&self, ip: IpAddr) -> bool {
        let windows = self.auth_fail.lock().expect("auth-fail mutex poisoned");
        windows
            .get(&ip)
            .and_then(|w| w.locked_until)
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }

    fn record_auth_failure(&self, ip: IpAddr) {
        let mut windows = self.auth_fail.lock().expect("auth-fail mutex poisoned");
        let now = Instant::now();
        let window = windows.entry(ip).or_insert_with(|| FailWindow {
            timestamps: VecDeque::new(),
            locked_until: None,
        });
        window.timestamps.retain(|t| now.duration_since(*t) < Duration::from_secs(60));
        window.timestamps.push_back(now);
        if window.timestamps.len() as u32 >= defaults::AUTH_FAIL_RATE_LIMIT_PER_MIN {
            window.locked_until = Some(now + defaults::AUTH_FAIL_LOCKOUT);
            warn!(%ip, "auth-failure rate exceeded, locking out IP");
        }
    }

    /// `true` if this IP is still within its admin-endpoint rate limit.
    fn admit_admin_call(&self, ip: IpAddr) -> bool {
        let mut calls = self.admin_calls.lock().expect("admin-calls mutex poisoned");
        let now = Instant::now();
        let window = calls.entry(ip).or_insert_with(|| AdminWindow {
            timestamps: VecDeque::new(),
        });
        window.timestamps.retain(|t| now.duration_since(*t) < Duration::from_secs(60));
        if window.timestamps.len() as u32 >= defaults::ADMIN_RATE_LIMIT_PER_MIN {
            return false;
        }
        window.timestamps.push_back(now);
        true
    }
}

fn client_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
        })
        .or_else(|| connect_info.map(|ci| ci.0.ip()))
        .unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

pub async fn bearer_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path().to_string();
    if PUBLIC_PATHS.contains(&path.as_str()) {
        return Ok(next.run(request).await);
    }

    let connect_info = request.extensions().get::<ConnectInfo<SocketAddr>>().copied();
    let ip = client_ip(request.headers(), connect_info.as_ref());
    let is_admin_path = ADMIN_PATHS.contains(&path.as_str());

    let Some(api_token) = &state.auth.api_token else {
        // No token configured: auth is disabled, but admin rate limiting still applies.
        if is_admin_path && !state.auth.admit_admin_call(ip) {
            return Err(ApiError::rate_limited("admin endpoint rate limit exceeded"));
        }
        return Ok(next.run(request).await);
    };

    if state.auth.is_locked_out(ip) {
        return Err(ApiError::rate_limited("too many authentication failures; temporarily locked out"));
    }

    let required_token: &str = if is_admin_path {
        state.auth.admin_token.as_deref().unwrap_or(api_token.as_str())
    } else {
        api_token.as_str()
    };

    match bearer_token(request.headers()) {
        None => {
            state.auth.record_auth_failure(ip);
            return Err(ApiError::unauthorized("missing bearer token"));
        }
        Some(token) if token != required_token => {
            state.auth.record_auth_failure(ip);
            return Err(ApiError::forbidden("bearer token does not match"));
        }
        Some(_) => {}
    }

    if is_admin_path && !state.auth.admit_admin_call(ip) {
        return Err(ApiError::rate_limited("admin endpoint rate limit exceeded"));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lockout_engages_after_repeated_failures() {
        let guard = AuthGuard::new(Some("secret".to_string()), None);
        let ip = IpAddr::from([10, 0, 0, 1]);
        for _ in 0..defaults::AUTH_FAIL_RATE_LIMIT_PER_MIN {
            guard.record_auth_failure(ip);
        }
        assert!(guard.is_locked_out(ip));
    }

    #[test]
    fn admin_rate_limit_denies_after_threshold() {
        let guard = AuthGuard::new(None, None);
        let ip = IpAddr::from([10, 0, 0, 2]);
        for _ in 0..defaults::ADMIN_RATE_LIMIT_PER_MIN {
            assert!(guard.admit_admin_call(ip));
        }
        assert!(!guard.admit_admin_call(ip));
    }
}
