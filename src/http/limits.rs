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

//! Admission control and content-type enforcement (§4.11 "Limits").
//! Body-size limiting and the whole-request timeout are applied as
//! `tower_http`/`tower` layers directly in [`crate::http::routes::build_router`].

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::http::error_mapping::ApiError;
use crate::http::state::AppState;

/// Global admission semaphore (§4.11, §5 "Scheduling model"). A request that
/// cannot acquire a permit is rejected with 503 + Retry-After rather than
/// queued, so a stuck approval `wait_for` cannot silently back up the world.
pub async fn admission_control(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match state.admission.clone().try_acquire_owned() {
        Ok(_permit) => Ok(next.run(request).await),
        Err(_) => Err(ApiError::overloaded("server at capacity, try again shortly").with_retry_after(1)),
    }
}

/// Requires `Content-Type: application/json` on requests that carry a body.
pub async fn require_json_content_type(request: Request, next: Next) -> Result<Response, ApiError> {
    let has_body = matches!(request.method(), &axum::http::Method::POST | &axum::http::Method::PUT);
    if has_body {
        let content_type = request
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !content_type.starts_with("application/json") {
            return Err(ApiError::unsupported_media_type("Content-Type must be application/json"));
        }
    }
    Ok(next.run(request).await)
}
