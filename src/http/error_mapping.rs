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

//! HTTP error mapping (§7): every error surfaced to a client goes through
//! `ApiError`, which never leaks a stack trace or internal path.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::ShieldError;
use crate::types::Verdict;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub error_code: &'static str,
    pub request_id: Option<String>,
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    fn new(status: StatusCode, error_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error_code,
            request_id: None,
            retry_after_secs: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "auth_required", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "auth_forbidden", message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "rate_limited", message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", message)
    }

    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media_type", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", message)
    }

    pub fn overloaded(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "overloaded", message)
    }

    pub fn killed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "kill_switch_active", message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, "timeout", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl From<ShieldError> for ApiError {
    fn from(err: ShieldError) -> Self {
        let error_code = match &err {
            ShieldError::RuleCompilation(_) => "rule_compilation_error",
            ShieldError::SanitizerRejection(_) => "sanitizer_rejection",
            ShieldError::ApprovalBackend(_) => "approval_backend_error",
            ShieldError::Validation(_) => "validation_error",
            ShieldError::Authentication(_) => "auth_forbidden",
            ShieldError::Configuration(_) => "configuration_error",
            ShieldError::Engine(_) => "engine_error",
            ShieldError::Platform(_) => "platform_error",
            ShieldError::Io(_) => "io_error",
        };
        Self::new(err.status_code(), error_code, err.user_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = self.retry_after_secs;
        let body = ErrorBody {
            error: self.message,
            error_code: self.error_code.to_string(),
            request_id: self.request_id,
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = axum::http::HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Body shape for an uncaught failure mapped to the engine's on-error policy
/// (§7 "Any uncaught exception... returned as `{verdict: configured_on_error,
/// request_id, error_code}`").
#[derive(Debug, Serialize)]
pub struct OnErrorBody {
    pub verdict: Verdict,
    pub request_id: Option<String>,
    pub error_code: &'static str,
}

pub fn on_error_response(verdict: Verdict, request_id: Option<String>) -> Response {
    let body = OnErrorBody {
        verdict,
        request_id,
        error_code: "engine_error",
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
