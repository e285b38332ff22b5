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

//! Compiles a `RawRuleSet` (raw YAML shapes) into a `RuleSet` (regexes built,
//! tool-indexed buckets populated, content-hash computed). Fail-fast: any
//! regex that does not compile fails the whole load (§3 invariant).

use std::collections::HashSet;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::{ShieldError, ShieldResult};
use crate::rules::loader::{
    RawChainCondition, RawPredicate, RawRateLimit, RawRule, RawRuleSet, RawSessionPredicate,
    RawToolSelector,
};
use crate::rules::model::{
    ApprovalStrategy, ArgsMatchRule, ChainCondition, CompareOp, ContainsPatternKind,
    ContextPredicate, CustomPiiPattern, DayOfWeekRange, Predicate, RateLimit, RateLimitScope,
    RateLimitSelector, Rule, RuleIndex, RuleSet, SessionConfig, SessionPredicate,
    TaintChainConfig, TimeOfDayRange, ToolSelector, WhenClause,
};
use crate::types::{Severity, Verdict};

/// Deterministic content-hash over the normalized (trimmed) textual source;
/// used as the identifier by reload and by HTTP `/reload` responses.
pub fn content_hash(source: &str) -> String {
    let normalized = source.trim();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn compile(raw: RawRuleSet, source: &str) -> ShieldResult<RuleSet> {
    let mut ids: HashSet<String> = HashSet::new();
    let mut rules = Vec::with_capacity(raw.rules.len());

    for (order, raw_rule) in raw.rules.into_iter().enumerate() {
        if raw_rule.enabled && !ids.insert(raw_rule.id.clone()) {
            return Err(ShieldError::RuleCompilation(format!(
                "duplicate rule id '{}'",
                raw_rule.id
            )));
        }
        rules.push(compile_rule(raw_rule, order)?);
    }

    let index = build_index(&rules);

    let rate_limits = raw
        .rate_limits
        .into_iter()
        .map(compile_rate_limit)
        .collect::<ShieldResult<Vec<_>>>()?;

    let custom_pii_patterns = raw
        .pii_patterns
        .into_iter()
        .map(|p| {
            let pattern = Regex::new(&p.pattern).map_err(|e| {
                ShieldError::RuleCompilation(format!(
                    "invalid pii_patterns regex for label '{}': {e}",
                    p.label
                ))
            })?;
            Ok(CustomPiiPattern {
                label: p.label,
                pattern,
            })
        })
        .collect::<ShieldResult<Vec<_>>>()?;

    let default_verdict = parse_verdict(&raw.default_verdict).ok_or_else(|| {
        ShieldError::RuleCompilation(format!(
            "invalid default_verdict '{}'",
            raw.default_verdict
        ))
    })?;

    Ok(RuleSet {
        shield_name: raw.shield_name,
        version: raw.version,
        default_verdict,
        rules,
        index,
        rate_limits,
        custom_pii_patterns,
        taint_chain: TaintChainConfig {
            enabled: raw.taint_chain.enabled,
            outgoing_tools: raw.taint_chain.outgoing_tools,
        },
        session: SessionConfig {
            event_buffer_size: raw.session.event_buffer_size,
        },
        content_hash: content_hash(source),
    })
}

fn compile_rule(raw: RawRule, order: usize) -> ShieldResult<Rule> {
    let verdict = parse_verdict(&raw.then)
        .ok_or_else(|| ShieldError::RuleCompilation(format!("rule '{}': invalid then '{}'", raw.id, raw.then)))?;

    let severity = match raw.severity.as_deref() {
        None => Severity::default(),
        Some(s) => parse_severity(s)
            .ok_or_else(|| ShieldError::RuleCompilation(format!("rule '{}': invalid severity '{}'", raw.id, s)))?,
    };

    let approval_strategy = match raw.approval_strategy.as_deref() {
        None => None,
        Some("once") => Some(ApprovalStrategy::Once),
        Some("per_session") => Some(ApprovalStrategy::PerSession),
        Some("per_rule") => Some(ApprovalStrategy::PerRule),
        Some("per_tool") => Some(ApprovalStrategy::PerTool),
        Some(other) => {
            return Err(ShieldError::RuleCompilation(format!(
                "rule '{}': invalid approval_strategy '{}'",
                raw.id, other
            )))
        }
    };

    let when = compile_when(raw.when, &raw.id)?;

    Ok(Rule {
        id: raw.id,
        description: raw.description,
        when,
        verdict,
        severity,
        message: raw.message,
        enabled: raw.enabled,
        approval_strategy,
        source_order: order,
    })
}

fn compile_when(raw: crate::rules::loader::RawWhen, rule_id: &str) -> ShieldResult<WhenClause> {
    let tool = match raw.tool {
        None => None,
        Some(RawToolSelector::List(names)) => Some(ToolSelector::List(names)),
        Some(RawToolSelector::Single(s)) => Some(compile_tool_string(&s, rule_id)?),
    };

    let mut args_match = Vec::with_capacity(raw.args_match.len());
    for (field, pred) in raw.args_match {
        args_match.push(ArgsMatchRule {
            field,
            predicate: compile_predicate(pred, rule_id)?,
        });
    }

    let mut session = Vec::with_capacity(raw.session.len());
    for (key, pred) in raw.session {
        let tool = key
            .strip_prefix("tool_count.")
            .ok_or_else(|| {
                ShieldError::RuleCompilation(format!(
                    "rule '{}': unsupported session predicate key '{}'",
                    rule_id, key
                ))
            })?
            .to_string();
        session.push(compile_session_predicate(tool, pred, rule_id)?);
    }

    let mut context = Vec::with_capacity(raw.context.len());
    for (key, value) in raw.context {
        context.push(compile_context_predicate(key, value, rule_id)?);
    }

    let chain = raw
        .chain
        .into_iter()
        .map(|c| compile_chain(c, rule_id))
        .collect::<ShieldResult<Vec<_>>>()?;

    Ok(WhenClause {
        tool,
        args_match,
        session,
        sender: raw.sender,
        context,
        chain,
    })
}

fn compile_tool_string(s: &str, rule_id: &str) -> ShieldResult<ToolSelector> {
    if s == "*" {
        return Ok(ToolSelector::Wildcard);
    }
    // A literal tool name matches `^[\w.\-]+$` exactly (mirrors the sanitizer's
    // own tool-name bound, §4.2); anything else is treated as a regex.
    let is_plain_literal = !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-');
    if is_plain_literal {
        return Ok(ToolSelector::Literal(s.to_string()));
    }
    let re = Regex::new(s).map_err(|e| {
        ShieldError::RuleCompilation(format!("rule '{}': invalid tool regex '{}': {e}", rule_id, s))
    })?;
    Ok(ToolSelector::Regex(re))
}

fn compile_predicate(raw: RawPredicate, rule_id: &str) -> ShieldResult<Predicate> {
    if let Some(pattern) = raw.regex {
        let re = Regex::new(&pattern).map_err(|e| {
            ShieldError::RuleCompilation(format!("rule '{}': invalid regex '{}': {e}", rule_id, pattern))
        })?;
        return Ok(Predicate::Regex(re));
    }
    if let Some(s) = raw.contains {
        return Ok(Predicate::Contains(s));
    }
    if let Some(s) = raw.starts_with {
        return Ok(Predicate::StartsWith(s));
    }
    if let Some(v) = raw.eq {
        return Ok(Predicate::Eq(v));
    }
    if let Some(kind) = raw.contains_pattern {
        if kind == "pii" {
            return Ok(Predicate::ContainsPattern(ContainsPatternKind::Pii));
        }
        return Err(ShieldError::RuleCompilation(format!(
            "rule '{}': unsupported contains_pattern kind '{}'",
            rule_id, kind
        )));
    }
    Err(ShieldError::RuleCompilation(format!(
        "rule '{}': empty predicate",
        rule_id
    )))
}

fn compile_session_predicate(
    tool: String,
    raw: RawSessionPredicate,
    rule_id: &str,
) -> ShieldResult<SessionPredicate> {
    let (op, value) = if let Some(v) = raw.gt {
        (CompareOp::Gt, v)
    } else if let Some(v) = raw.lt {
        (CompareOp::Lt, v)
    } else if let Some(v) = raw.gte {
        (CompareOp::Gte, v)
    } else if let Some(v) = raw.lte {
        (CompareOp::Lte, v)
    } else if let Some(v) = raw.eq {
        (CompareOp::Eq, v)
    } else {
        return Err(ShieldError::RuleCompilation(format!(
            "rule '{}': empty session predicate for tool_count.{}",
            rule_id, tool
        )));
    };
    Ok(SessionPredicate { tool, op, value })
}

fn compile_context_predicate(key: String, value: String, rule_id: &str) -> ShieldResult<ContextPredicate> {
    if key == "time_of_day" {
        return Ok(ContextPredicate::TimeOfDay(parse_time_of_day(&value, rule_id)?));
    }
    if key == "day_of_week" {
        return Ok(ContextPredicate::DayOfWeek(parse_day_of_week(&value, rule_id)?));
    }
    let (negate, key) = if let Some(stripped) = key.strip_prefix('!') {
        (true, stripped.to_string())
    } else {
        (false, key)
    };
    Ok(ContextPredicate::KeyValue { key, value, negate })
}

fn parse_time_of_day(value: &str, rule_id: &str) -> ShieldResult<TimeOfDayRange> {
    let (start, end) = value.split_once('-').ok_or_else(|| {
        ShieldError::RuleCompilation(format!(
            "rule '{}': invalid time_of_day '{}', expected HH:MM-HH:MM",
            rule_id, value
        ))
    })?;
    Ok(TimeOfDayRange {
        start_minutes: parse_hhmm(start, rule_id)?,
        end_minutes: parse_hhmm(end, rule_id)?,
    })
}

fn parse_hhmm(s: &str, rule_id: &str) -> ShieldResult<u32> {
    let (h, m) = s.trim().split_once(':').ok_or_else(|| {
        ShieldError::RuleCompilation(format!("rule '{}': invalid HH:MM '{}'", rule_id, s))
    })?;
    let h: u32 = h
        .parse()
        .map_err(|_| ShieldError::RuleCompilation(format!("rule '{}': invalid hour '{}'", rule_id, h)))?;
    let m: u32 = m
        .parse()
        .map_err(|_| ShieldError::RuleCompilation(format!("rule '{}': invalid minute '{}'", rule_id, m)))?;
    if h > 23 || m > 59 {
        return Err(ShieldError::RuleCompilation(format!(
            "rule '{}': time out of range '{}:{}'",
            rule_id, h, m
        )));
    }
    Ok(h * 60 + m)
}

fn weekday_index(s: &str, rule_id: &str) -> ShieldResult<u8> {
    match s.trim().to_lowercase().as_str() {
        "mon" => Ok(0),
        "tue" => Ok(1),
        "wed" => Ok(2),
        "thu" => Ok(3),
        "fri" => Ok(4),
        "sat" => Ok(5),
        "sun" => Ok(6),
        other => Err(ShieldError::RuleCompilation(format!(
            "rule '{}': invalid day_of_week token '{}'",
            rule_id, other
        ))),
    }
}

fn parse_day_of_week(value: &str, rule_id: &str) -> ShieldResult<DayOfWeekRange> {
    let (start, end) = value.split_once('-').ok_or_else(|| {
        ShieldError::RuleCompilation(format!(
            "rule '{}': invalid day_of_week '{}', expected Mon-Fri",
            rule_id, value
        ))
    })?;
    Ok(DayOfWeekRange {
        start: weekday_index(start, rule_id)?,
        end: weekday_index(end, rule_id)?,
    })
}

fn compile_chain(raw: RawChainCondition, rule_id: &str) -> ShieldResult<ChainCondition> {
    if raw.within_seconds <= 0.0 {
        return Err(ShieldError::RuleCompilation(format!(
            "rule '{}': chain within_seconds must be > 0",
            rule_id
        )));
    }
    let min_count = raw.min_count.unwrap_or(1);
    if min_count < 1 {
        return Err(ShieldError::RuleCompilation(format!(
            "rule '{}': chain min_count must be >= 1",
            rule_id
        )));
    }
    let verdict_filter = match raw.verdict {
        None => None,
        Some(v) => Some(parse_verdict(&v).ok_or_else(|| {
            ShieldError::RuleCompilation(format!("rule '{}': invalid chain verdict '{}'", rule_id, v))
        })?),
    };
    Ok(ChainCondition {
        tool: raw.tool,
        within_seconds: raw.within_seconds,
        verdict_filter,
        min_count,
    })
}

fn compile_rate_limit(raw: RawRateLimit) -> ShieldResult<RateLimit> {
    let tool = if raw.tool == "*" {
        RateLimitSelector::Wildcard
    } else {
        RateLimitSelector::Literal(raw.tool)
    };
    let scope = match raw.scope.as_str() {
        "session" => RateLimitScope::Session,
        "global" => RateLimitScope::Global,
        other => {
            return Err(ShieldError::RuleCompilation(format!(
                "invalid rate_limit scope '{}'",
                other
            )))
        }
    };
    Ok(RateLimit {
        tool,
        max_calls: raw.max_calls,
        window_seconds: raw.window,
        scope,
    })
}

fn parse_verdict(s: &str) -> Option<Verdict> {
    match s.to_lowercase().as_str() {
        "allow" => Some(Verdict::Allow),
        "block" => Some(Verdict::Block),
        "redact" => Some(Verdict::Redact),
        "approve" => Some(Verdict::Approve),
        _ => None,
    }
}

fn parse_severity(s: &str) -> Option<Severity> {
    match s.to_lowercase().as_str() {
        "low" => Some(Severity::Low),
        "medium" => Some(Severity::Medium),
        "high" => Some(Severity::High),
        "critical" => Some(Severity::Critical),
        _ => None,
    }
}

/// Builds the tool-indexed lookup: literal buckets, a wildcard bucket, and a
/// regex bucket scanned linearly (§4.1). List-selector rules are indexed once
/// per named tool so the literal bucket lookup finds them directly.
fn build_index(rules: &[Rule]) -> RuleIndex {
    let mut index = RuleIndex::default();
    for (i, rule) in rules.iter().enumerate() {
        if !rule.enabled {
            continue;
        }
        match &rule.when.tool {
            None | Some(ToolSelector::Wildcard) => index.wildcard.push(i),
            Some(ToolSelector::Literal(name)) => {
                index.by_tool.entry(name.clone()).or_default().push(i)
            }
            Some(ToolSelector::List(names)) => {
                for name in names {
                    index.by_tool.entry(name.clone()).or_default().push(i)
                }
            }
            Some(ToolSelector::Regex(_)) => index.regex.push(i),
        }
    }
    index
}

/// Parse + compile in one step, from an in-memory YAML string.
pub fn compile_str(source: &str) -> ShieldResult<RuleSet> {
    let raw = crate::rules::loader::parse_str(source)?;
    compile(raw, source)
}

/// Parse + compile in one step, from a `.yaml`/`.yml` file on disk.
pub fn compile_file(path: &std::path::Path) -> ShieldResult<RuleSet> {
    let (raw, source) = crate::rules::loader::parse_file(path)?;
    compile(raw, &source)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
shield_name: test-shield
version: "1"
default_verdict: allow
rules:
  - id: no-rm
    when:
      tool: exec
      args_match:
        command:
          regex: "rm\\s+-rf"
    then: block
    message: "destructive"
  - id: pii-redact
    when:
      tool: send_message
    then: redact
rate_limits:
  - tool: web_fetch
    max_calls: 10
    window: 60
    scope: session
"#;

    #[test]
    fn compiles_sample_ruleset() {
        let rs = compile_str(SAMPLE).unwrap();
        assert_eq!(rs.rules.len(), 2);
        assert_eq!(rs.rules_count(), 2);
        assert_eq!(rs.rate_limits.len(), 1);
        assert!(!rs.content_hash.is_empty());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let dup = r#"
shield_name: dup
rules:
  - id: a
    when: { tool: "*" }
    then: allow
  - id: a
    when: { tool: "*" }
    then: block
"#;
        let err = compile_str(dup).unwrap_err();
        assert!(err.to_string().contains("duplicate rule id"));
    }

    #[test]
    fn rejects_bad_regex() {
        let bad = r#"
shield_name: bad
rules:
  - id: a
    when:
      tool: exec
      args_match:
        command: { regex: "(" }
    then: block
"#;
        assert!(compile_str(bad).is_err());
    }

    #[test]
    fn content_hash_is_deterministic() {
        let a = content_hash("hello\n");
        let b = content_hash("hello\n");
        let c = content_hash("hello world\n");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn builds_tool_index() {
        let rs = compile_str(SAMPLE).unwrap();
        assert!(rs.index.by_tool.contains_key("exec"));
        assert!(rs.index.by_tool.contains_key("send_message"));
    }
}
