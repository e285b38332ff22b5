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

//! Matcher: `find_best_match(tool, args, session, sender, event_ring) -> Option<&Rule>` (§4.1).
//!
//! All when-clause conditions AND together. Rules carrying `chain` conditions
//! are evaluated last within a bucket since chain-checking needs the event
//! ring; everything else is cheap comparisons against the args tree.

use chrono::{Datelike, Local, Timelike};

use crate::rules::model::{
    ArgsMatchRule, ChainCondition, ContextPredicate, ContainsPatternKind, Predicate, Rule, RuleSet,
    WhenClause,
};
use crate::session::SessionSnapshot;

/// Everything the matcher needs about the call, gathered by the engine before
/// consulting it (§4.1 contract).
pub struct MatchContext<'a> {
    pub tool: &'a str,
    pub args: &'a serde_json::Value,
    pub session: &'a SessionSnapshot,
    pub sender: Option<&'a str>,
    pub context: &'a std::collections::HashMap<String, String>,
    /// Non-empty iff the PII detector already found matches in `args` this call.
    pub pii_detected: bool,
}

/// Best-matching rule, or `None` if no rule matched (the rule-set's default
/// verdict then applies — §4.1 edge cases).
pub fn find_best_match<'a>(ruleset: &'a RuleSet, ctx: &MatchContext) -> Option<&'a Rule> {
    let mut candidate_indices: Vec<usize> = Vec::new();

    if let Some(bucket) = ruleset.index.by_tool.get(ctx.tool) {
        candidate_indices.extend(bucket.iter().copied());
    }
    candidate_indices.extend(ruleset.index.wildcard.iter().copied());
    candidate_indices.extend(ruleset.index.regex.iter().copied());

    let mut matches: Vec<&Rule> = candidate_indices
        .into_iter()
        .map(|i| &ruleset.rules[i])
        .filter(|r| r.enabled)
        .filter(|r| tool_selector_matches(r, ctx.tool))
        .filter(|r| when_matches(&r.when, ctx))
        .collect();

    // Stable de-dup: a rule could be indexed in both by_tool (via a List
    // selector) and wildcard only if misconfigured; index construction
    // guarantees disjointness in practice, so this is a defensive no-op.
    matches.sort_by_key(|r| r.source_order);
    matches.dedup_by_key(|r| r.source_order);

    matches.into_iter().max_by(|a, b| {
        a.verdict
            .cmp(&b.verdict)
            .then(a.severity.cmp(&b.severity))
            .then(b.source_order.cmp(&a.source_order))
    })
}

fn tool_selector_matches(rule: &Rule, tool: &str) -> bool {
    match &rule.when.tool {
        Some(sel) => sel.matches(tool),
        None => true,
    }
}

fn when_matches(when: &WhenClause, ctx: &MatchContext) -> bool {
    if let Some(sender_pred) = &when.sender {
        match ctx.sender {
            Some(actual) if actual == sender_pred => {}
            _ => return false,
        }
    }

    for arg_rule in &when.args_match {
        if !args_match_rule(arg_rule, ctx) {
            return false;
        }
    }

    for session_pred in &when.session {
        let count = ctx.session.tool_count(&session_pred.tool) as i64;
        if !session_pred.op.apply(count, session_pred.value) {
            return false;
        }
    }

    for context_pred in &when.context {
        if !context_matches(context_pred, ctx.context) {
            return false;
        }
    }

    for chain in &when.chain {
        if !chain_matches(chain, ctx.session) {
            return false;
        }
    }

    true
}

fn args_match_rule(rule: &ArgsMatchRule, ctx: &MatchContext) -> bool {
    if rule.field == "any_field" {
        return any_field_values(ctx.args).any(|leaf| predicate_matches(&rule.predicate, leaf, ctx));
    }
    let value = lookup_field(ctx.args, &rule.field);
    match value {
        Some(v) => predicate_matches(&rule.predicate, v, ctx),
        None => false,
    }
}

/// Resolves a dotted field path (e.g. `"payload.to"`) against a JSON object.
fn lookup_field<'a>(args: &'a serde_json::Value, field: &str) -> Option<&'a serde_json::Value> {
    let mut current = args;
    for segment in field.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Depth-first iterator over every stringifiable leaf value of `args`.
fn any_field_values(value: &serde_json::Value) -> Box<dyn Iterator<Item = &serde_json::Value> + '_> {
    match value {
        serde_json::Value::Object(map) => {
            Box::new(map.values().flat_map(any_field_values))
        }
        serde_json::Value::Array(items) => Box::new(items.iter().flat_map(any_field_values)),
        leaf => Box::new(std::iter::once(leaf)),
    }
}

fn predicate_matches(predicate: &Predicate, value: &serde_json::Value, ctx: &MatchContext) -> bool {
    match predicate {
        Predicate::Regex(re) => match value_as_str(value) {
            Some(s) => re.is_match(&s),
            None => false,
        },
        Predicate::Contains(needle) => match value_as_str(value) {
            Some(s) => s.contains(needle.as_str()),
            None => false,
        },
        Predicate::StartsWith(prefix) => match value_as_str(value) {
            Some(s) => s.starts_with(prefix.as_str()),
            None => false,
        },
        Predicate::Eq(expected) => value == expected,
        Predicate::ContainsPattern(ContainsPatternKind::Pii) => ctx.pii_detected,
    }
}

/// Best-effort string coercion for regex/contains/starts_with predicates.
/// Non-stringifiable values (nested objects/arrays reached via `any_field`)
/// simply fail the predicate rather than panicking (§4.1 edge cases).
fn value_as_str(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Null => None,
        serde_json::Value::Object(_) | serde_json::Value::Array(_) => None,
    }
}

fn context_matches(predicate: &ContextPredicate, context: &std::collections::HashMap<String, String>) -> bool {
    match predicate {
        ContextPredicate::TimeOfDay(range) => {
            let now = Local::now();
            let minutes = now.hour() * 60 + now.minute();
            range.contains(minutes)
        }
        ContextPredicate::DayOfWeek(range) => {
            let today = Local::now().weekday().num_days_from_monday() as u8;
            range.contains(today)
        }
        ContextPredicate::KeyValue { key, value, negate } => match context.get(key) {
            Some(actual) => {
                let eq = actual == value;
                if *negate {
                    !eq
                } else {
                    eq
                }
            }
            // Missing context key fails the predicate closed, regardless of negation (§4.1).
            None => false,
        },
    }
}

fn chain_matches(condition: &ChainCondition, session: &SessionSnapshot) -> bool {
    let window = std::time::Duration::from_secs_f64(condition.within_seconds);
    let now = std::time::SystemTime::now();
    let count = session
        .event_ring
        .iter()
        .filter(|ev| ev.tool == condition.tool)
        .filter(|ev| now.duration_since(ev.timestamp).map(|d| d <= window).unwrap_or(false))
        .filter(|ev| match condition.verdict_filter {
            Some(v) => ev.verdict == v,
            None => true,
        })
        .count() as u32;
    count >= condition.min_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::compiler::compile_str;

    const SAMPLE: &str = r#"
shield_name: test
rules:
  - id: no-rm
    when:
      tool: exec
      args_match:
        command: { regex: "rm\\s+-rf" }
    then: block
    severity: high
  - id: deploy-gate
    when:
      tool: deploy
    then: approve
    severity: medium
"#;

    fn ctx<'a>(
        tool: &'a str,
        args: &'a serde_json::Value,
        session: &'a SessionSnapshot,
        context: &'a std::collections::HashMap<String, String>,
    ) -> MatchContext<'a> {
        MatchContext {
            tool,
            args,
            session,
            sender: None,
            context,
            pii_detected: false,
        }
    }

    fn empty_session() -> SessionSnapshot {
        SessionSnapshot {
            id: "s1".into(),
            tool_counts: Default::default(),
            total_calls: 0,
            taints: Default::default(),
            pii_tainted: false,
            taint_reason: String::new(),
            event_ring: Vec::new(),
        }
    }

    #[test]
    fn matches_destructive_command() {
        let rs = compile_str(SAMPLE).unwrap();
        let args = serde_json::json!({"command": "rm -rf /"});
        let session = empty_session();
        let empty_ctx = std::collections::HashMap::new();
        let m = find_best_match(&rs, &ctx("exec", &args, &session, &empty_ctx));
        assert_eq!(m.unwrap().id, "no-rm");
    }

    #[test]
    fn non_matching_command_falls_through() {
        let rs = compile_str(SAMPLE).unwrap();
        let args = serde_json::json!({"command": "ls"});
        let session = empty_session();
        let empty_ctx = std::collections::HashMap::new();
        let m = find_best_match(&rs, &ctx("exec", &args, &session, &empty_ctx));
        assert!(m.is_none());
    }

    #[test]
    fn any_field_scans_nested_values() {
        let yaml = r#"
shield_name: test
rules:
  - id: leak
    when:
      tool: send_message
      args_match:
        any_field: { contains: "secret" }
    then: block
"#;
        let rs = compile_str(yaml).unwrap();
        let args = serde_json::json!({"payload": {"body": "this has a secret inside"}});
        let session = empty_session();
        let empty_ctx = std::collections::HashMap::new();
        let m = find_best_match(&rs, &ctx("send_message", &args, &session, &empty_ctx));
        assert_eq!(m.unwrap().id, "leak");
    }
}
