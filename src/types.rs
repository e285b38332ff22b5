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

//! Core domain enums shared across the whole engine: verdicts, severities,
//! operating modes and PII type tags. Pure data, no I/O.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// The authoritative decision produced by the engine for one tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Allow,
    Block,
    Redact,
    Approve,
}

impl Verdict {
    /// Strictness rank used for tie-breaking: BLOCK > APPROVE > REDACT > ALLOW.
    fn strictness(self) -> u8 {
        match self {
            Verdict::Block => 3,
            Verdict::Approve => 2,
            Verdict::Redact => 1,
            Verdict::Allow => 0,
        }
    }

    /// True if, under AUDIT mode, this verdict would otherwise have had a blocking effect
    /// (i.e. anything that isn't a plain ALLOW).
    pub fn is_blocking_class(self) -> bool {
        !matches!(self, Verdict::Allow)
    }
}

impl PartialOrd for Verdict {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Verdict {
    fn cmp(&self, other: &Self) -> Ordering {
        self.strictness().cmp(&other.strictness())
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Allow => "ALLOW",
            Verdict::Block => "BLOCK",
            Verdict::Redact => "REDACT",
            Verdict::Approve => "APPROVE",
        };
        write!(f, "{s}")
    }
}

/// Severity is secondary to verdict in tie-breaking, but still orderable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Medium
    }
}

/// Engine operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    /// Rules are enforced: BLOCK/APPROVE/REDACT take effect.
    Enforce,
    /// Every check runs, nothing ever blocks; the would-be verdict is recorded.
    Audit,
    /// Every check is allowed without evaluation.
    Disabled,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Enforce
    }
}

/// What to do when the engine itself fails (matcher panic, detector error, timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OnErrorPolicy {
    Block,
    Allow,
}

impl Default for OnErrorPolicy {
    fn default() -> Self {
        OnErrorPolicy::Block
    }
}

/// What to do when an APPROVE verdict times out waiting for a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OnTimeoutPolicy {
    Block,
    AutoApprove,
}

impl Default for OnTimeoutPolicy {
    fn default() -> Self {
        OnTimeoutPolicy::Block
    }
}

/// Built-in and custom PII classification tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PiiType {
    Email,
    Phone,
    CreditCard,
    Ssn,
    Iban,
    IpAddress,
    Passport,
    DateOfBirth,
    /// User-defined pattern, carries its own label (e.g. `CUSTOM:internal_id`).
    #[serde(untagged)]
    Custom(String),
}

impl fmt::Display for PiiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PiiType::Email => write!(f, "EMAIL"),
            PiiType::Phone => write!(f, "PHONE"),
            PiiType::CreditCard => write!(f, "CREDIT_CARD"),
            PiiType::Ssn => write!(f, "SSN"),
            PiiType::Iban => write!(f, "IBAN"),
            PiiType::IpAddress => write!(f, "IP_ADDRESS"),
            PiiType::Passport => write!(f, "PASSPORT"),
            PiiType::DateOfBirth => write!(f, "DATE_OF_BIRTH"),
            PiiType::Custom(label) => write!(f, "CUSTOM:{label}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_strictness_order() {
        assert!(Verdict::Block > Verdict::Approve);
        assert!(Verdict::Approve > Verdict::Redact);
        assert!(Verdict::Redact > Verdict::Allow);
    }

    #[test]
    fn verdict_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Verdict::Allow).unwrap(), "\"ALLOW\"");
        assert_eq!(serde_json::to_string(&Verdict::Redact).unwrap(), "\"REDACT\"");
    }

    #[test]
    fn audit_blocking_class() {
        assert!(!Verdict::Allow.is_blocking_class());
        assert!(Verdict::Block.is_blocking_class());
        assert!(Verdict::Approve.is_blocking_class());
        assert!(Verdict::Redact.is_blocking_class());
    }
}
