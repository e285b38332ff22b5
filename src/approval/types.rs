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

//! Approval request/response data model and the backend trait (§3, §4.7).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ShieldResult;

/// Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub request_id: String,
    pub tool_name: String,
    /// Already PII-masked for transport (§4.7 "Sensitive data handling").
    pub args: serde_json::Value,
    pub rule_id: String,
    pub message: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

/// Immutable once created. At most one response per request (first-writer-wins).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub request_id: String,
    pub approved: bool,
    pub responder: Option<String>,
    pub comment: Option<String>,
    pub responded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    pub ok: bool,
    pub detail: String,
}

/// `/api/v1/check-approval` lookup result for a single request id.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalStatusRecord {
    pub status: ApprovalStatus,
    pub responder: Option<String>,
    pub comment: Option<String>,
}

/// Shared interface for approval delivery backends (§4.7 "Backends").
#[async_trait]
pub trait ApprovalBackend: Send + Sync {
    async fn submit(&self, request: ApprovalRequest) -> ShieldResult<()>;

    /// Blocks (asynchronously) until a response arrives or `timeout` elapses.
    async fn wait_for(&self, request_id: &str, timeout: Duration) -> Option<ApprovalResponse>;

    /// Idempotent: the first call for a given `request_id` wins; later calls are no-ops
    /// that return `false`.
    fn respond(
        &self,
        request_id: &str,
        approved: bool,
        responder: Option<String>,
        comment: Option<String>,
    ) -> bool;

    fn pending(&self) -> Vec<ApprovalRequest>;

    /// Looks up the current status of a request id, whether pending or resolved.
    /// Returns `None` if `request_id` has never been submitted (or has been GC'd).
    fn status(&self, request_id: &str) -> Option<ApprovalStatusRecord>;

    async fn health(&self) -> BackendHealth;

    /// Invoked once at startup, before the listening socket binds (§5 "Startup").
    async fn start(&self) -> ShieldResult<()> {
        Ok(())
    }

    /// Invoked during graceful shutdown (§5).
    async fn stop(&self) {}
}
