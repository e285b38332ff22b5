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

//! InMemory approval backend (§4.7): a map of pending requests and a map of
//! resolved responses, each guarded by a mutex. `wait_for` parks on a
//! per-request oneshot channel woken by `respond`; `respond` is idempotent —
//! the first caller wins, later callers are no-ops.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::oneshot;
use tracing::warn;

use crate::approval::types::{
    ApprovalBackend, ApprovalRequest, ApprovalResponse, ApprovalStatus, ApprovalStatusRecord, BackendHealth,
};
use crate::error::ShieldResult;

struct Resolved {
    response: ApprovalResponse,
    resolved_at: Instant,
}

pub struct InMemoryApprovalBackend {
    pending: Mutex<HashMap<String, (ApprovalRequest, Instant)>>,
    resolved: Mutex<HashMap<String, Resolved>>,
    waiters: Mutex<HashMap<String, oneshot::Sender<ApprovalResponse>>>,
    ttl: Duration,
}

impl InMemoryApprovalBackend {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            resolved: Mutex::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Drops pending/resolved entries older than `ttl`. Run on the same
    /// cadence as the session sweeper (§4.7).
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut dropped = 0;
        {
            let mut pending = self.pending.lock().expect("approval pending mutex poisoned");
            let before = pending.len();
            pending.retain(|_, (_, created)| now.duration_since(*created) < self.ttl);
            dropped += before - pending.len();
        }
        {
            let mut resolved = self.resolved.lock().expect("approval resolved mutex poisoned");
            let before = resolved.len();
            resolved.retain(|_, r| now.duration_since(r.resolved_at) < self.ttl);
            dropped += before - resolved.len();
        }
        dropped
    }
}

#[async_trait]
impl ApprovalBackend for InMemoryApprovalBackend {
    async fn submit(&self, request: ApprovalRequest) -> ShieldResult<()> {
        let mut pending = self.pending.lock().expect("approval pending mutex poisoned");
        pending.insert(request.request_id.clone(), (request, Instant::now()));
        Ok(())
    }

    async fn wait_for(&self, request_id: &str, timeout: Duration) -> Option<ApprovalResponse> {
        if let Some(resolved) = self.resolved.lock().expect("approval resolved mutex poisoned").get(request_id) {
            return Some(resolved.response.clone());
        }

        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .expect("approval waiters mutex poisoned")
            .insert(request_id.to_string(), tx);

        // Re-check after registering: `respond` may have fired between the
        // first lookup and the insert above.
        if let Some(resolved) = self.resolved.lock().expect("approval resolved mutex poisoned").get(request_id) {
            self.waiters.lock().expect("approval waiters mutex poisoned").remove(request_id);
            return Some(resolved.response.clone());
        }

        let outcome = tokio::time::timeout(timeout, rx).await;
        self.waiters.lock().expect("approval waiters mutex poisoned").remove(request_id);
        match outcome {
            Ok(Ok(response)) => Some(response),
            _ => None,
        }
    }

    fn respond(
        &self,
        request_id: &str,
        approved: bool,
        responder: Option<String>,
        comment: Option<String>,
    ) -> bool {
        let mut resolved = self.resolved.lock().expect("approval resolved mutex poisoned");
        if resolved.contains_key(request_id) {
            return false;
        }
        let response = ApprovalResponse {
            request_id: request_id.to_string(),
            approved,
            responder,
            comment,
            responded_at: Utc::now(),
        };
        resolved.insert(
            request_id.to_string(),
            Resolved {
                response: response.clone(),
                resolved_at: Instant::now(),
            },
        );
        drop(resolved);

        self.pending.lock().expect("approval pending mutex poisoned").remove(request_id);

        if let Some(tx) = self.waiters.lock().expect("approval waiters mutex poisoned").remove(request_id) {
            if tx.send(response).is_err() {
                warn!(request_id, "approval responder dropped before receiving notification");
            }
        }
        true
    }

    fn pending(&self) -> Vec<ApprovalRequest> {
        self.pending
            .lock()
            .expect("approval pending mutex poisoned")
            .values()
            .map(|(req, _)| req.clone())
            .collect()
    }

    fn status(&self, request_id: &str) -> Option<ApprovalStatusRecord> {
        if let Some(resolved) = self.resolved.lock().expect("approval resolved mutex poisoned").get(request_id) {
            let status = if resolved.response.approved {
                ApprovalStatus::Approved
            } else {
                ApprovalStatus::Denied
            };
            return Some(ApprovalStatusRecord {
                status,
                responder: resolved.response.responder.clone(),
                comment: resolved.response.comment.clone(),
            });
        }
        if self.pending.lock().expect("approval pending mutex poisoned").contains_key(request_id) {
            return Some(ApprovalStatusRecord {
                status: ApprovalStatus::Pending,
                responder: None,
                comment: None,
            });
        }
        None
    }

    async fn health(&self) -> BackendHealth {
        BackendHealth {
            ok: true,
            detail: "in-memory backend".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str) -> ApprovalRequest {
        ApprovalRequest {
            request_id: id.to_string(),
            tool_name: "deploy".to_string(),
            args: serde_json::json!({}),
            rule_id: "deploy-gate".to_string(),
            message: "deploy requested".to_string(),
            session_id: "s1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn wait_for_times_out_without_response() {
        let backend = InMemoryApprovalBackend::new(Duration::from_secs(3600));
        backend.submit(request("r1")).await.unwrap();
        let result = backend.wait_for("r1", Duration::from_millis(50)).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn wait_for_resolves_on_respond() {
        let backend = std::sync::Arc::new(InMemoryApprovalBackend::new(Duration::from_secs(3600)));
        backend.submit(request("r2")).await.unwrap();

        let waiter_backend = backend.clone();
        let waiter = tokio::spawn(async move {
            waiter_backend.wait_for("r2", Duration::from_secs(5)).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(backend.respond("r2", true, Some("alice".to_string()), None));

        let response = waiter.await.unwrap().expect("should resolve");
        assert!(response.approved);
    }

    #[test]
    fn respond_is_idempotent() {
        let backend = InMemoryApprovalBackend::new(Duration::from_secs(3600));
        assert!(backend.respond("r3", true, None, None));
        assert!(!backend.respond("r3", false, None, None));
    }
}
