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

//! Approval cache: per-rule strategy (ONCE/PER_SESSION/PER_RULE/PER_TOOL)
//! that lets a previously-granted (or denied) approval short-circuit the
//! backend on a later, equivalent call (§4.7 "Approval cache").

use std::time::Duration;

use moka::sync::Cache;
use sha2::{Digest, Sha256};

use crate::rules::model::ApprovalStrategy;

#[derive(Debug, Clone)]
pub struct CachedDecision {
    pub approved: bool,
}

pub struct ApprovalCache {
    cache: Cache<String, CachedDecision>,
}

impl ApprovalCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn key(
        strategy: ApprovalStrategy,
        session_id: &str,
        rule_id: &str,
        tool: &str,
        args: &serde_json::Value,
    ) -> String {
        let args_hash = {
            let mut hasher = Sha256::new();
            hasher.update(args.to_string().as_bytes());
            hex::encode(hasher.finalize())
        };
        match strategy {
            ApprovalStrategy::Once => format!("once:{rule_id}:{tool}:{args_hash}"),
            ApprovalStrategy::PerSession => format!("per_session:{session_id}:{rule_id}"),
            ApprovalStrategy::PerRule => format!("per_rule:{rule_id}"),
            ApprovalStrategy::PerTool => format!("per_tool:{tool}"),
        }
    }

    pub fn get(&self, key: &str) -> Option<CachedDecision> {
        self.cache.get(key)
    }

    pub fn put(&self, key: String, approved: bool) {
        self.cache.insert(key, CachedDecision { approved });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_strategy_keys_by_args_hash() {
        let a = ApprovalCache::key(ApprovalStrategy::Once, "s1", "r1", "deploy", &serde_json::json!({"x": 1}));
        let b = ApprovalCache::key(ApprovalStrategy::Once, "s1", "r1", "deploy", &serde_json::json!({"x": 2}));
        assert_ne!(a, b);
    }

    #[test]
    fn per_rule_strategy_ignores_session_and_args() {
        let a = ApprovalCache::key(ApprovalStrategy::PerRule, "s1", "r1", "deploy", &serde_json::json!({"x": 1}));
        let b = ApprovalCache::key(ApprovalStrategy::PerRule, "s2", "r1", "deploy", &serde_json::json!({"x": 2}));
        assert_eq!(a, b);
    }

    #[test]
    fn cache_hit_returns_stored_decision() {
        let cache = ApprovalCache::new(100, Duration::from_secs(60));
        cache.put("k".to_string(), true);
        assert!(cache.get("k").unwrap().approved);
        assert!(cache.get("missing").is_none());
    }
}
