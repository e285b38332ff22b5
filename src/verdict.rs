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

//! Verdict builder: stateless formatter for the agent-facing message (§4.6).

use crate::types::{PiiType, Verdict};

/// The outcome of a `check()` call, ready to serialize for the HTTP layer.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub verdict: Verdict,
    pub message: String,
    pub rule_id: Option<String>,
    pub modified_args: Option<serde_json::Value>,
    pub pii_types: Vec<PiiType>,
    pub approval_id: Option<String>,
}

pub const RATE_LIMIT_RULE_ID: &str = "__rate_limit__";
pub const TAINT_RULE_ID: &str = "__taint_chain__";
pub const SANITIZER_RULE_ID_PREFIX: &str = "__sanitizer__";

pub fn allow() -> CheckResult {
    CheckResult {
        verdict: Verdict::Allow,
        message: "allowed".to_string(),
        rule_id: None,
        modified_args: None,
        pii_types: Vec::new(),
        approval_id: None,
    }
}

pub fn block_from_rule(rule_id: &str, description: Option<&str>, message: Option<&str>) -> CheckResult {
    let reason = message
        .or(description)
        .map(str::to_string)
        .unwrap_or_else(|| format!("blocked by rule '{rule_id}'"));
    CheckResult {
        verdict: Verdict::Block,
        message: format!("Blocked by rule '{rule_id}': {reason}\nSuggestion: adjust the call to satisfy this policy and retry."),
        rule_id: Some(rule_id.to_string()),
        modified_args: None,
        pii_types: Vec::new(),
        approval_id: None,
    }
}

pub fn block_sanitizer(detector: &str, detail: &str) -> CheckResult {
    CheckResult {
        verdict: Verdict::Block,
        message: format!(
            "Blocked by sanitizer '{detector}': {detail}\nSuggestion: remove the offending content and retry."
        ),
        rule_id: Some(format!("{SANITIZER_RULE_ID_PREFIX}{detector}")),
        modified_args: None,
        pii_types: Vec::new(),
        approval_id: None,
    }
}

pub fn block_rate_limit(tool: &str) -> CheckResult {
    CheckResult {
        verdict: Verdict::Block,
        message: format!("rate limit exceeded for tool '{tool}'\nSuggestion: wait for the window to roll over before retrying."),
        rule_id: Some(RATE_LIMIT_RULE_ID.to_string()),
        modified_args: None,
        pii_types: Vec::new(),
        approval_id: None,
    }
}

pub fn block_taint(tool: &str, reason: &str) -> CheckResult {
    CheckResult {
        verdict: Verdict::Block,
        message: format!(
            "Blocked: session is tainted ({reason}); tool '{tool}' is an outgoing channel under the active taint-chain policy."
        ),
        rule_id: Some(TAINT_RULE_ID.to_string()),
        modified_args: None,
        pii_types: Vec::new(),
        approval_id: None,
    }
}

pub fn redact(rule_id: &str, modified_args: serde_json::Value, pii_types: Vec<PiiType>) -> CheckResult {
    CheckResult {
        verdict: Verdict::Redact,
        message: format!("Arguments redacted by rule '{rule_id}': sensitive content was masked before the call proceeded."),
        rule_id: Some(rule_id.to_string()),
        modified_args: Some(modified_args),
        pii_types,
        approval_id: None,
    }
}

pub fn approve_pending(rule_id: &str, approval_id: &str) -> CheckResult {
    CheckResult {
        verdict: Verdict::Approve,
        message: format!("Call to rule '{rule_id}' is pending human approval (id {approval_id})."),
        rule_id: Some(rule_id.to_string()),
        modified_args: None,
        pii_types: Vec::new(),
        approval_id: Some(approval_id.to_string()),
    }
}

pub fn approval_timed_out(rule_id: &str) -> CheckResult {
    CheckResult {
        verdict: Verdict::Block,
        message: format!("Approval timed out for rule '{rule_id}'. Approval timed out waiting for a human response."),
        rule_id: Some(rule_id.to_string()),
        modified_args: None,
        pii_types: Vec::new(),
        approval_id: None,
    }
}

pub fn approval_denied(rule_id: &str, comment: Option<&str>) -> CheckResult {
    let suffix = comment.map(|c| format!(" ({c})")).unwrap_or_default();
    CheckResult {
        verdict: Verdict::Block,
        message: format!("Approval denied for rule '{rule_id}'{suffix}."),
        rule_id: Some(rule_id.to_string()),
        modified_args: None,
        pii_types: Vec::new(),
        approval_id: None,
    }
}

pub fn approval_no_backend(rule_id: &str) -> CheckResult {
    CheckResult {
        verdict: Verdict::Block,
        message: format!("Blocked: rule '{rule_id}' requires approval but no backend is configured."),
        rule_id: Some(rule_id.to_string()),
        modified_args: None,
        pii_types: Vec::new(),
        approval_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_message_contains_rule_context() {
        let r = block_from_rule("no-rm", Some("destructive command"), None);
        assert!(r.message.contains("destructive"));
        assert_eq!(r.rule_id.unwrap(), "no-rm");
    }

    #[test]
    fn rate_limit_uses_fixed_rule_id() {
        let r = block_rate_limit("web_fetch");
        assert_eq!(r.rule_id.unwrap(), RATE_LIMIT_RULE_ID);
        assert!(r.message.contains("rate limit"));
    }

    #[test]
    fn approval_timeout_message_matches_contract() {
        let r = approval_timed_out("deploy-gate");
        assert!(r.message.contains("Approval timed out"));
    }
}
