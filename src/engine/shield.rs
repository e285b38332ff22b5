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

//! `ShieldEngine`: composes rule-set, matcher, sanitizer, PII detector, rate
//! limiter, approval subsystem and trace recorder into the pipeline
//! described by §2 "Control flow for `check(tool, args, session, sender)`".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::approval::{ApprovalBackend, ApprovalCache, ApprovalRequest};
use crate::error::{ShieldError, ShieldResult};
use crate::matcher::{find_best_match, MatchContext};
use crate::pii::PiiDetector;
use crate::ratelimit::RateLimiter;
use crate::rules::model::RuleSet;
use crate::rules::{compiler, loader};
use crate::sanitizer::{self, SanitizerConfig};
use crate::session::SessionStore;
use crate::trace::{TraceApproval, TraceConfig, TraceRecord, TraceRecorder};
use crate::types::{Mode, OnErrorPolicy, OnTimeoutPolicy, PiiType, Verdict};
use crate::verdict::{self, CheckResult};

#[derive(Debug, Clone)]
pub struct ShieldEngineConfig {
    pub mode: Mode,
    pub sanitizer: SanitizerConfig,
    pub on_error: OnErrorPolicy,
    pub on_timeout: OnTimeoutPolicy,
    pub check_timeout: Duration,
    pub approval_timeout: Duration,
    pub session_ttl: Duration,
    pub session_capacity: usize,
    pub approval_cache_capacity: u64,
    pub approval_cache_ttl: Duration,
}

impl Default for ShieldEngineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Enforce,
            sanitizer: SanitizerConfig::default(),
            on_error: OnErrorPolicy::Block,
            on_timeout: OnTimeoutPolicy::Block,
            check_timeout: Duration::from_secs(5),
            approval_timeout: Duration::from_secs(300),
            session_ttl: Duration::from_secs(3600),
            session_capacity: 10_000,
            approval_cache_capacity: 10_000,
            approval_cache_ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CheckRequest {
    pub tool_name: String,
    pub args: serde_json::Value,
    pub session_id: Option<String>,
    pub sender: Option<String>,
    pub context: std::collections::HashMap<String, String>,
    pub request_id: Option<String>,
}

pub struct ShieldEngine {
    config: ShieldEngineConfig,
    ruleset: RwLock<Arc<RuleSet>>,
    rate_limiter: RwLock<Arc<RateLimiter>>,
    sessions: SessionStore,
    trace: TraceRecorder,
    approval_backend: Option<Arc<dyn ApprovalBackend>>,
    approval_cache: ApprovalCache,
    mode: RwLock<Mode>,
    killed: AtomicBool,
}

impl ShieldEngine {
    pub fn new(
        ruleset: RuleSet,
        config: ShieldEngineConfig,
        trace_config: TraceConfig,
        approval_backend: Option<Arc<dyn ApprovalBackend>>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(ruleset.rate_limits.clone());
        let session = SessionStore::new(config.session_ttl, config.session_capacity, ruleset.session.event_buffer_size);
        Self {
            mode: RwLock::new(config.mode),
            approval_cache: ApprovalCache::new(config.approval_cache_capacity, config.approval_cache_ttl),
            ruleset: RwLock::new(Arc::new(ruleset)),
            rate_limiter: RwLock::new(Arc::new(rate_limiter)),
            sessions: session,
            trace: TraceRecorder::new(trace_config),
            approval_backend,
            config,
            killed: AtomicBool::new(false),
        }
    }

    pub fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.killed.store(false, Ordering::SeqCst);
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub async fn mode(&self) -> Mode {
        *self.mode.read().await
    }

    pub async fn set_mode(&self, mode: Mode) {
        *self.mode.write().await = mode;
    }

    pub async fn ruleset(&self) -> Arc<RuleSet> {
        self.ruleset.read().await.clone()
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn trace(&self) -> &TraceRecorder {
        &self.trace
    }

    /// `check(tool, args, session, sender)` — §2 control flow, wrapped in a
    /// timeout; any failure maps to the configured on-error verdict rather
    /// than propagating (§7 "Engine errors").
    pub async fn check(&self, req: CheckRequest) -> CheckResult {
        let request_id = req.request_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

        if self.is_killed() {
            return self.finish_blocked_without_trace("kill-switch active", request_id);
        }
        if self.mode().await == Mode::Disabled {
            return verdict::allow();
        }

        match tokio::time::timeout(self.config.check_timeout, self.check_inner(req, request_id.clone())).await {
            Ok(result) => result,
            Err(_) => {
                warn!(request_id, "check() exceeded configured timeout");
                self.on_error_result("check timed out")
            }
        }
    }

    fn finish_blocked_without_trace(&self, reason: &str, _request_id: String) -> CheckResult {
        CheckResult {
            verdict: Verdict::Block,
            message: format!("Blocked: {reason}."),
            rule_id: None,
            modified_args: None,
            pii_types: Vec::new(),
            approval_id: None,
        }
    }

    fn on_error_result(&self, reason: &str) -> CheckResult {
        let verdict = match self.config.on_error {
            OnErrorPolicy::Block => Verdict::Block,
            OnErrorPolicy::Allow => Verdict::Allow,
        };
        CheckResult {
            verdict,
            message: format!("Engine error ({reason}); coerced to configured on-error policy."),
            rule_id: None,
            modified_args: None,
            pii_types: Vec::new(),
            approval_id: None,
        }
    }

    async fn check_inner(&self, req: CheckRequest, request_id: String) -> CheckResult {
        let start = Instant::now();
        let mode = self.mode().await;
        let session_id = req.session_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let session = self.sessions.get_or_create(&session_id);

        if let Err(rejection) = sanitizer::validate_tool_name(&req.tool_name) {
            let result = verdict::block_sanitizer(&rejection.detector, &rejection.detail);
            return self.finalize_coerced(mode, result, &session_id, &req.tool_name, start, &request_id, &req.args);
        }
        if let Err(rejection) = sanitizer::sanitize(&req.args, &self.config.sanitizer) {
            let result = verdict::block_sanitizer(&rejection.detector, &rejection.detail);
            return self.finalize_coerced(mode, result, &session_id, &req.tool_name, start, &request_id, &req.args);
        }

        let ruleset = self.ruleset.read().await.clone();

        if session.pii_tainted
            && ruleset.taint_chain.enabled
            && ruleset.taint_chain.outgoing_tools.iter().any(|t| t == &req.tool_name)
        {
            let result = verdict::block_taint(&req.tool_name, &session.taint_reason);
            return self.finalize_coerced(mode, result, &session_id, &req.tool_name, start, &request_id, &req.args);
        }

        let detector = PiiDetector::new(&ruleset.custom_pii_patterns);
        let pii_matches = detector.scan_value(&req.args);
        let pii_detected = !pii_matches.is_empty();

        let match_ctx = MatchContext {
            tool: &req.tool_name,
            args: &req.args,
            session: &session,
            sender: req.sender.as_deref(),
            context: &req.context,
            pii_detected,
        };
        let matched_rule = find_best_match(&ruleset, &match_ctx);

        let (base_verdict, rule_id, description, message, approval_strategy) = match matched_rule {
            Some(rule) => (
                rule.verdict,
                Some(rule.id.clone()),
                rule.description.clone(),
                rule.message.clone(),
                rule.approval_strategy,
            ),
            None => (ruleset.default_verdict, None, None, None, None),
        };

        let rate_limiter = self.rate_limiter.read().await.clone();
        if !rate_limiter.check(&req.tool_name, &session_id) {
            let result = verdict::block_rate_limit(&req.tool_name);
            return self.finalize_coerced(mode, result, &session_id, &req.tool_name, start, &request_id, &req.args);
        }
        rate_limiter.record(&req.tool_name, &session_id);

        let result = match base_verdict {
            Verdict::Allow => verdict::allow(),
            Verdict::Block => match rule_id.as_deref() {
                Some(id) => verdict::block_from_rule(id, description.as_deref(), message.as_deref()),
                None => verdict::block_from_rule("__default__", None, Some("default verdict is block")),
            },
            Verdict::Redact => {
                let masked = detector.mask_value(&req.args);
                let pii_types: Vec<PiiType> = pii_matches.iter().map(|m| m.pii_type.clone()).collect();
                verdict::redact(rule_id.as_deref().unwrap_or("__default__"), masked, pii_types)
            }
            Verdict::Approve => {
                self.handle_approval(
                    &req,
                    &session_id,
                    rule_id.as_deref().unwrap_or("__default__"),
                    approval_strategy,
                    &detector,
                )
                .await
            }
        };

        self.finalize_coerced(mode, result, &session_id, &req.tool_name, start, &request_id, &req.args)
    }

    /// Applies the AUDIT-mode BLOCK→ALLOW coercion (§2 step 11: "AUDIT logs
    /// everything but never blocks") uniformly to every terminal verdict the
    /// pipeline can produce, then records the trace/session event.
    #[allow(clippy::too_many_arguments)]
    fn finalize_coerced(
        &self,
        mode: Mode,
        mut result: CheckResult,
        session_id: &str,
        tool: &str,
        start: Instant,
        request_id: &str,
        original_args: &serde_json::Value,
    ) -> CheckResult {
        if mode == Mode::Audit && result.verdict.is_blocking_class() {
            let would_be = result.verdict;
            result = verdict::allow();
            result.message = format!("AUDIT mode: would have been {would_be} — {}", result.message);
        }
        self.finalize(session_id, tool, &result, start, request_id, None, original_args);
        result
    }

    async fn handle_approval(
        &self,
        req: &CheckRequest,
        session_id: &str,
        rule_id: &str,
        strategy: Option<crate::rules::model::ApprovalStrategy>,
        detector: &PiiDetector<'_>,
    ) -> CheckResult {
        if let Some(strategy) = strategy {
            let key = ApprovalCache::key(strategy, session_id, rule_id, &req.tool_name, &req.args);
            if let Some(cached) = self.approval_cache.get(&key) {
                return if cached.approved {
                    verdict::allow()
                } else {
                    verdict::approval_denied(rule_id, Some("cached prior denial"))
                };
            }
        }

        let Some(backend) = &self.approval_backend else {
            return verdict::approval_no_backend(rule_id);
        };

        let masked_args = detector.mask_value(&req.args);
        let request = ApprovalRequest {
            request_id: Uuid::new_v4().to_string(),
            tool_name: req.tool_name.clone(),
            args: masked_args,
            rule_id: rule_id.to_string(),
            message: format!("approval requested for tool '{}'", req.tool_name),
            session_id: session_id.to_string(),
            created_at: chrono::Utc::now(),
        };
        let request_id = request.request_id.clone();

        if let Err(e) = backend.submit(request).await {
            warn!(error = %e, "approval backend submit failed");
            return verdict::approval_no_backend(rule_id);
        }

        let response = backend.wait_for(&request_id, self.config.approval_timeout).await;
        let mut result = match response {
            Some(resp) if resp.approved => {
                if let Some(strategy) = strategy {
                    let key = ApprovalCache::key(strategy, session_id, rule_id, &req.tool_name, &req.args);
                    self.approval_cache.put(key, true);
                }
                verdict::allow()
            }
            Some(resp) => {
                if let Some(strategy) = strategy {
                    let key = ApprovalCache::key(strategy, session_id, rule_id, &req.tool_name, &req.args);
                    self.approval_cache.put(key, false);
                }
                verdict::approval_denied(rule_id, resp.comment.as_deref())
            }
            None => match self.config.on_timeout {
                OnTimeoutPolicy::Block => verdict::approval_timed_out(rule_id),
                OnTimeoutPolicy::AutoApprove => verdict::allow(),
            },
        };
        result.approval_id = Some(request_id);
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn finalize(
        &self,
        session_id: &str,
        tool: &str,
        result: &CheckResult,
        start: Instant,
        request_id: &str,
        approval: Option<TraceApproval>,
        original_args: &serde_json::Value,
    ) {
        self.sessions.record_event(session_id, tool, result.verdict, original_args);
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        let trace_args = result.modified_args.clone().unwrap_or_else(|| original_args.clone());
        self.trace.record(TraceRecord {
            timestamp: chrono::Utc::now(),
            session_id: session_id.to_string(),
            tool: tool.to_string(),
            verdict: result.verdict,
            rule_id: result.rule_id.clone(),
            pii_types: result.pii_types.clone(),
            latency_ms,
            args_hash: None,
            args: Some(trace_args),
            request_id: request_id.to_string(),
            approval,
        });
    }

    /// `post_check(tool, result_string, session)` — runs PII detection on a
    /// tool's *result*; on match, taints the session (§4.9).
    pub async fn post_check(&self, tool: &str, result_text: &str, session_id: &str) -> (Vec<PiiType>, Option<String>) {
        let ruleset = self.ruleset.read().await.clone();
        let detector = PiiDetector::new(&ruleset.custom_pii_patterns);
        let matches = detector.scan(result_text);
        if matches.is_empty() {
            return (Vec::new(), None);
        }

        let pii_types: Vec<PiiType> = matches.iter().map(|m| m.pii_type.clone()).collect();
        if ruleset.taint_chain.enabled {
            let reason = format!("post-check PII match on tool '{tool}': {}", pii_types[0]);
            self.sessions.set_pii_tainted(session_id, reason);
            for t in &pii_types {
                self.sessions.add_taint(session_id, &t.to_string());
            }
        }
        let redacted = detector.mask_string(result_text);
        (pii_types, Some(redacted))
    }

    pub fn clear_taint(&self, session_id: &str) -> bool {
        self.sessions.clear_taint(session_id)
    }

    /// `reload(new_source)` — loads and compiles off the critical path; on
    /// success atomically swaps rule-set + rate-limiter, otherwise the old
    /// rule-set remains in service (§4.9, §5).
    pub async fn reload(&self, path: &std::path::Path) -> ShieldResult<Arc<RuleSet>> {
        let (raw, source) = loader::parse_file(path)?;
        let compiled = compiler::compile(raw, &source)?;
        let compiled = Arc::new(compiled);

        let new_limiter = {
            let old_limiter = self.rate_limiter.read().await;
            Arc::new(old_limiter.rebuild(compiled.rate_limits.clone()))
        };

        {
            let mut ruleset_guard = self.ruleset.write().await;
            *ruleset_guard = compiled.clone();
        }
        {
            let mut limiter_guard = self.rate_limiter.write().await;
            *limiter_guard = new_limiter;
        }
        info!(rules = compiled.rules_count(), hash = %compiled.content_hash, "rule-set reloaded");
        Ok(compiled)
    }

    /// Re-points the engine at an in-memory rule-set directly (used by tests
    /// and by the `/reload` HTTP handler when given inline YAML).
    pub async fn reload_from_str(&self, source: &str) -> ShieldResult<Arc<RuleSet>> {
        let compiled = compiler::compile_str(source)?;
        let compiled = Arc::new(compiled);
        let new_limiter = {
            let old_limiter = self.rate_limiter.read().await;
            Arc::new(old_limiter.rebuild(compiled.rate_limits.clone()))
        };
        {
            let mut ruleset_guard = self.ruleset.write().await;
            *ruleset_guard = compiled.clone();
        }
        {
            let mut limiter_guard = self.rate_limiter.write().await;
            *limiter_guard = new_limiter;
        }
        Ok(compiled)
    }

    pub async fn health(&self) -> ShieldResult<()> {
        if let Some(backend) = &self.approval_backend {
            let health = backend.health().await;
            if !health.ok {
                return Err(ShieldError::ApprovalBackend(health.detail));
            }
        }
        Ok(())
    }

    /// `/api/v1/respond-approval` — delegates to the configured backend.
    /// Returns `false` if no backend is configured or the id is unknown/already resolved.
    pub fn respond_approval(&self, request_id: &str, approved: bool, responder: Option<String>, comment: Option<String>) -> bool {
        let Some(backend) = &self.approval_backend else {
            return false;
        };
        backend.respond(request_id, approved, responder, comment)
    }

    /// `/api/v1/check-approval` — current status of a previously-submitted request.
    pub fn approval_status(&self, request_id: &str) -> Option<crate::approval::types::ApprovalStatusRecord> {
        self.approval_backend.as_ref().and_then(|b| b.status(request_id))
    }

    /// `/api/v1/pending-approvals` — masked requests still awaiting a response.
    pub fn pending_approvals(&self) -> Vec<ApprovalRequest> {
        self.approval_backend.as_ref().map(|b| b.pending()).unwrap_or_default()
    }

    pub fn has_approval_backend(&self) -> bool {
        self.approval_backend.is_some()
    }
}
