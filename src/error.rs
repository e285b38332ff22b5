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

//! Domain error types - secure error handling with no information disclosure.

use axum::http::StatusCode;
use thiserror::Error;

/// Main error type for the shield engine and its HTTP surface.
#[derive(Error, Debug)]
pub enum ShieldError {
    /// Rule-set failed to parse or compile (HTTP 500 from reload, fatal at startup).
    #[error("rule compilation error: {0}")]
    RuleCompilation(String),

    /// Sanitizer rejected the payload before matching (synthetic BLOCK, not an HTTP error).
    #[error("sanitizer rejected payload: {0}")]
    SanitizerRejection(String),

    /// Approval backend is unreachable or misconfigured.
    #[error("approval backend error: {0}")]
    ApprovalBackend(String),

    /// Validation error on an inbound HTTP request (HTTP 422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Authentication error (HTTP 401/403).
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Configuration error (fatal at startup).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Engine-internal error: matcher/detector panic, regex backtrack timeout, etc.
    /// Caught at the engine boundary and mapped to the configured on-error verdict.
    #[error("engine error: {0}")]
    Engine(String),

    /// Platform error: disk write failure, watcher I/O error. Logged, never raised to clients.
    #[error("platform error: {0}")]
    Platform(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShieldError {
    /// User-facing message with no stack traces or internal paths.
    pub fn user_message(&self) -> String {
        match self {
            ShieldError::RuleCompilation(_) => "rule set failed to compile".to_string(),
            ShieldError::SanitizerRejection(reason) => format!("rejected: {reason}"),
            ShieldError::ApprovalBackend(_) => "approval backend unavailable".to_string(),
            ShieldError::Validation(reason) => format!("validation failed: {reason}"),
            ShieldError::Authentication(reason) => format!("authentication failed: {reason}"),
            ShieldError::Configuration(_) => "internal configuration error".to_string(),
            ShieldError::Engine(_) => "internal engine error".to_string(),
            ShieldError::Platform(_) => "internal system error".to_string(),
            ShieldError::Io(_) => "internal I/O error".to_string(),
        }
    }

    /// HTTP status this error maps to when surfaced directly (outside the check pipeline,
    /// which always returns 200 with a verdict body per §7).
    pub fn status_code(&self) -> StatusCode {
        match self {
            ShieldError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ShieldError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ShieldError::SanitizerRejection(_) => StatusCode::OK,
            ShieldError::ApprovalBackend(_) => StatusCode::OK,
            ShieldError::RuleCompilation(_)
            | ShieldError::Configuration(_)
            | ShieldError::Engine(_)
            | ShieldError::Platform(_)
            | ShieldError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type ShieldResult<T> = Result<T, ShieldError>;
