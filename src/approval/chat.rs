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

//! Chat-channel approval backend (§4.7): `submit` posts to an outbound
//! webhook carrying two action buttons (`request_id:approve|deny` as opaque
//! payload); `respond` is triggered by the inbound callback delivery, which
//! arrives through the same HTTP surface as a manual `/respond-approval`
//! call. State tracking (pending/resolved/waiters) is delegated to an
//! internal [`InMemoryApprovalBackend`] — the chat backend only adds the
//! outbound delivery step.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::approval::memory::InMemoryApprovalBackend;
use crate::approval::types::{
    ApprovalBackend, ApprovalRequest, ApprovalResponse, ApprovalStatusRecord, BackendHealth,
};
use crate::error::ShieldResult;

const RETRY_DELAYS_MS: [u64; 3] = [1_000, 2_000, 4_000];

pub struct ChatApprovalBackend {
    inner: InMemoryApprovalBackend,
    client: reqwest::Client,
    webhook_url: String,
}

impl ChatApprovalBackend {
    pub fn new(webhook_url: String, approval_ttl: Duration, request_timeout: Duration) -> Self {
        Self {
            inner: InMemoryApprovalBackend::new(approval_ttl),
            client: reqwest::Client::builder()
                .timeout(request_timeout)
                .build()
                .expect("reqwest client configuration is always valid"),
            webhook_url,
        }
    }

    pub fn sweep_expired(&self) -> usize {
        self.inner.sweep_expired()
    }

    async fn deliver(&self, request: &ApprovalRequest) {
        let payload = serde_json::json!({
            "request_id": request.request_id,
            "tool_name": request.tool_name,
            "args": request.args,
            "message": request.message,
            "session_id": request.session_id,
            "actions": [
                {"label": "Approve", "value": format!("{}:approve", request.request_id)},
                {"label": "Deny", "value": format!("{}:deny", request.request_id)},
            ],
        });

        for (attempt, delay_ms) in std::iter::once(0).chain(RETRY_DELAYS_MS).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            match self.client.post(&self.webhook_url).json(&payload).send().await {
                Ok(resp) if resp.status().is_success() => return,
                Ok(resp) if resp.status().is_client_error() => {
                    error!(
                        status = %resp.status(),
                        request_id = %request.request_id,
                        "approval webhook rejected delivery, not retrying"
                    );
                    return;
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), attempt, "approval webhook delivery failed, will retry");
                }
                Err(e) => {
                    warn!(error = %e, attempt, "approval webhook delivery errored, will retry");
                }
            }
        }
        error!(request_id = %request.request_id, "approval webhook delivery exhausted retries");
    }
}

#[async_trait]
impl ApprovalBackend for ChatApprovalBackend {
    async fn submit(&self, request: ApprovalRequest) -> ShieldResult<()> {
        self.inner.submit(request.clone()).await?;
        self.deliver(&request).await;
        Ok(())
    }

    async fn wait_for(&self, request_id: &str, timeout: Duration) -> Option<ApprovalResponse> {
        self.inner.wait_for(request_id, timeout).await
    }

    fn respond(
        &self,
        request_id: &str,
        approved: bool,
        responder: Option<String>,
        comment: Option<String>,
    ) -> bool {
        self.inner.respond(request_id, approved, responder, comment)
    }

    fn pending(&self) -> Vec<ApprovalRequest> {
        self.inner.pending()
    }

    fn status(&self, request_id: &str) -> Option<ApprovalStatusRecord> {
        self.inner.status(request_id)
    }

    async fn health(&self) -> BackendHealth {
        match self.client.head(&self.webhook_url).send().await {
            Ok(resp) if !resp.status().is_server_error() => BackendHealth {
                ok: true,
                detail: format!("webhook {} reachable (status {})", self.webhook_url, resp.status()),
            },
            Ok(resp) => BackendHealth {
                ok: false,
                detail: format!("webhook {} returned {}", self.webhook_url, resp.status()),
            },
            Err(e) => BackendHealth {
                ok: false,
                detail: format!("webhook {} unreachable: {e}", self.webhook_url),
            },
        }
    }
}
