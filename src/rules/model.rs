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

//! Domain models for compiled rule-sets.
//!
//! This module contains pure data structures representing policies, rules,
//! tool-call when-clauses and decisions. It is free of I/O side effects;
//! `rules::loader` parses raw YAML into the `Raw*` shapes, `rules::compiler`
//! turns those into the `Rule`/`RuleSet` shapes defined here (precompiled
//! regexes, tool-indexed buckets).

use crate::types::{Severity, Verdict};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a rule's `tool` field matches an incoming tool name.
#[derive(Debug, Clone)]
pub enum ToolSelector {
    Literal(String),
    List(Vec<String>),
    Regex(Regex),
    Wildcard,
}

impl ToolSelector {
    pub fn matches(&self, tool_name: &str) -> bool {
        match self {
            ToolSelector::Literal(name) => name == tool_name,
            ToolSelector::List(names) => names.iter().any(|n| n == tool_name),
            ToolSelector::Regex(re) => re.is_match(tool_name),
            ToolSelector::Wildcard => true,
        }
    }
}

/// A tagged-sum predicate, replacing duck-typed dictionaries with an exhaustive switch.
#[derive(Debug, Clone)]
pub enum Predicate {
    Regex(Regex),
    Contains(String),
    StartsWith(String),
    Eq(serde_json::Value),
    /// Semantic predicate: satisfied iff the caller-supplied PII match list is non-empty.
    ContainsPattern(ContainsPatternKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainsPatternKind {
    Pii,
}

/// A single field→predicate entry in `args_match`. `any_field` is represented
/// by the special field name `"any_field"` and is expanded by the matcher.
#[derive(Debug, Clone)]
pub struct ArgsMatchRule {
    pub field: String,
    pub predicate: Predicate,
}

/// Comparison operator for `session.tool_count.<tool>` predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
}

impl CompareOp {
    pub fn apply(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CompareOp::Gt => lhs > rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Gte => lhs >= rhs,
            CompareOp::Lte => lhs <= rhs,
            CompareOp::Eq => lhs == rhs,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionPredicate {
    pub tool: String,
    pub op: CompareOp,
    pub value: i64,
}

/// A parsed `HH:MM-HH:MM` time-of-day range, evaluated in server local time.
#[derive(Debug, Clone, Copy)]
pub struct TimeOfDayRange {
    pub start_minutes: u32,
    pub end_minutes: u32,
}

impl TimeOfDayRange {
    pub fn contains(&self, minutes_since_midnight: u32) -> bool {
        if self.start_minutes <= self.end_minutes {
            (self.start_minutes..=self.end_minutes).contains(&minutes_since_midnight)
        } else {
            // wraps past midnight, e.g. 22:00-02:00
            minutes_since_midnight >= self.start_minutes || minutes_since_midnight <= self.end_minutes
        }
    }
}

/// A parsed `Mon-Fri` style day-of-week range. 0 = Monday .. 6 = Sunday (chrono::Weekday order).
#[derive(Debug, Clone, Copy)]
pub struct DayOfWeekRange {
    pub start: u8,
    pub end: u8,
}

impl DayOfWeekRange {
    pub fn contains(&self, day: u8) -> bool {
        if self.start <= self.end {
            (self.start..=self.end).contains(&day)
        } else {
            day >= self.start || day <= self.end
        }
    }
}

#[derive(Debug, Clone)]
pub enum ContextPredicate {
    TimeOfDay(TimeOfDayRange),
    DayOfWeek(DayOfWeekRange),
    /// Exact-match on an arbitrary context key, with optional negation.
    KeyValue {
        key: String,
        value: String,
        negate: bool,
    },
}

/// A temporal precondition: "tool X must/must-not have been called within N seconds".
#[derive(Debug, Clone)]
pub struct ChainCondition {
    pub tool: String,
    pub within_seconds: f64,
    pub verdict_filter: Option<Verdict>,
    pub min_count: u32,
}

/// Per-rule approval-cache strategy (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStrategy {
    Once,
    PerSession,
    PerRule,
    PerTool,
}

/// The full `when:` clause of a compiled rule.
#[derive(Debug, Clone, Default)]
pub struct WhenClause {
    pub tool: Option<ToolSelector>,
    pub args_match: Vec<ArgsMatchRule>,
    pub session: Vec<SessionPredicate>,
    pub sender: Option<String>,
    pub context: Vec<ContextPredicate>,
    pub chain: Vec<ChainCondition>,
}

/// A fully-compiled rule: every regex has been built, ready for the matcher's hot path.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub description: Option<String>,
    pub when: WhenClause,
    pub verdict: Verdict,
    pub severity: Severity,
    pub message: Option<String>,
    pub enabled: bool,
    pub approval_strategy: Option<ApprovalStrategy>,
    /// Position in the original document — used as the final tie-break key.
    pub source_order: usize,
}

/// Tool-selector for a rate limit entry: a literal tool name or `*`.
#[derive(Debug, Clone)]
pub enum RateLimitSelector {
    Literal(String),
    Wildcard,
}

impl RateLimitSelector {
    pub fn matches(&self, tool: &str) -> bool {
        match self {
            RateLimitSelector::Literal(t) => t == tool,
            RateLimitSelector::Wildcard => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    Session,
    Global,
}

#[derive(Debug, Clone)]
pub struct RateLimit {
    pub tool: RateLimitSelector,
    pub max_calls: u32,
    pub window_seconds: f64,
    pub scope: RateLimitScope,
}

/// Compiled custom PII pattern, augmenting the built-in set.
#[derive(Debug, Clone)]
pub struct CustomPiiPattern {
    pub label: String,
    pub pattern: Regex,
}

#[derive(Debug, Clone, Default)]
pub struct TaintChainConfig {
    pub enabled: bool,
    pub outgoing_tools: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub event_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 100,
        }
    }
}

/// Tool-indexed lookup built once at compile time: literal buckets, a wildcard
/// bucket, and a regex bucket scanned linearly (§4.1 "Indexing").
#[derive(Debug, Clone, Default)]
pub struct RuleIndex {
    pub by_tool: HashMap<String, Vec<usize>>,
    pub wildcard: Vec<usize>,
    pub regex: Vec<usize>,
    pub list: Vec<usize>,
}

/// The compiled rule-set consulted by the matcher. Immutable once built; reload
/// replaces the whole arena (§9 design notes: "Reload replaces the arena wholesale").
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub shield_name: String,
    pub version: String,
    pub default_verdict: Verdict,
    pub rules: Vec<Rule>,
    pub index: RuleIndex,
    pub rate_limits: Vec<RateLimit>,
    pub custom_pii_patterns: Vec<CustomPiiPattern>,
    pub taint_chain: TaintChainConfig,
    pub session: SessionConfig,
    /// SHA-256 hex of the normalized textual source; used by reload and idempotency.
    pub content_hash: String,
}

impl RuleSet {
    pub fn rules_count(&self) -> usize {
        self.rules.iter().filter(|r| r.enabled).count()
    }
}
