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

//! Raw YAML shapes for the rule-set wire format (§6.2). This is deliberately a
//! thin serde-driven parser — the CLI wizard / preset generators that author
//! these files are out of scope; this module only has to turn bytes on disk
//! into something `rules::compiler` can compile.

use serde::Deserialize;
#[cfg(feature = "schema")]
use schemars::JsonSchema;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{ShieldError, ShieldResult};

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct RawRuleSet {
    pub shield_name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_verdict")]
    pub default_verdict: String,
    #[serde(default)]
    pub rules: Vec<RawRule>,
    #[serde(default)]
    pub rate_limits: Vec<RawRateLimit>,
    #[serde(default)]
    pub pii_patterns: Vec<RawPiiPattern>,
    #[serde(default)]
    pub taint_chain: RawTaintChain,
    #[serde(default)]
    pub session: RawSessionConfig,
}

fn default_version() -> String {
    "1".to_string()
}

fn default_verdict() -> String {
    "allow".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct RawRule {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub when: RawWhen,
    pub then: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub approval_strategy: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Default)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct RawWhen {
    #[serde(default)]
    pub tool: Option<RawToolSelector>,
    #[serde(default)]
    pub args_match: HashMap<String, RawPredicate>,
    #[serde(default)]
    pub session: HashMap<String, RawSessionPredicate>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub context: HashMap<String, String>,
    #[serde(default)]
    pub chain: Vec<RawChainCondition>,
}

/// `tool:` accepts a bare string (literal/regex/wildcard) or a list of literals.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(untagged)]
pub enum RawToolSelector {
    Single(String),
    List(Vec<String>),
}

/// A predicate value, e.g. `{regex: "..."}`, `{contains: "..."}`, `{eq: 5}`.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct RawPredicate {
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub contains: Option<String>,
    #[serde(default)]
    pub starts_with: Option<String>,
    #[serde(default)]
    pub eq: Option<serde_json::Value>,
    #[serde(default)]
    pub contains_pattern: Option<String>,
}

/// `{gt|lt|gte|lte|eq: <int>}` for `session.tool_count.<tool>` predicates.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct RawSessionPredicate {
    #[serde(default)]
    pub gt: Option<i64>,
    #[serde(default)]
    pub lt: Option<i64>,
    #[serde(default)]
    pub gte: Option<i64>,
    #[serde(default)]
    pub lte: Option<i64>,
    #[serde(default)]
    pub eq: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct RawChainCondition {
    pub tool: String,
    pub within_seconds: f64,
    #[serde(default)]
    pub verdict: Option<String>,
    #[serde(default)]
    pub min_count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct RawRateLimit {
    pub tool: String,
    pub max_calls: u32,
    pub window: f64,
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_scope() -> String {
    "session".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct RawPiiPattern {
    #[serde(default = "default_custom_type")]
    #[serde(rename = "type")]
    pub pii_type: String,
    pub label: String,
    pub pattern: String,
}

fn default_custom_type() -> String {
    "CUSTOM".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct RawTaintChain {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub outgoing_tools: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct RawSessionConfig {
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
}

fn default_event_buffer_size() -> usize {
    100
}

impl Default for RawSessionConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: default_event_buffer_size(),
        }
    }
}

/// Parse a rule-set from an in-memory YAML string (the actual bytes that will
/// also be hashed for the content-hash — see `rules::compiler::content_hash`).
pub fn parse_str(source: &str) -> ShieldResult<RawRuleSet> {
    serde_yaml_ng::from_str(source)
        .map_err(|e| ShieldError::RuleCompilation(format!("YAML parse error: {e}")))
}

/// Parse a rule-set from a `.yaml`/`.yml` file on disk.
pub fn parse_file(path: &Path) -> ShieldResult<(RawRuleSet, String)> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| ShieldError::RuleCompilation(format!("cannot read {}: {e}", path.display())))?;
    let raw = parse_str(&source)?;
    Ok((raw, source))
}
