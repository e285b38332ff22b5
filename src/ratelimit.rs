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

//! Sliding-window rate limiter: per `(tool, session)` key a timestamp deque
//! (§4.5). Owned by the engine; rebuilt wholesale on reload but existing
//! per-key deques are carried over for continuity (best effort).

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::rules::model::{RateLimit, RateLimitScope};

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct Key {
    tool: String,
    scope_key: String,
}

struct Window {
    timestamps: VecDeque<Instant>,
}

pub struct RateLimiter {
    limits: Vec<RateLimit>,
    windows: Mutex<HashMap<Key, Window>>,
}

impl RateLimiter {
    pub fn new(limits: Vec<RateLimit>) -> Self {
        Self {
            limits,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Rebuilds the limiter from a new rule-set's rate limits, carrying over
    /// any existing per-key deques whose `(tool, scope_key)` still applies.
    pub fn rebuild(&self, new_limits: Vec<RateLimit>) -> RateLimiter {
        let old_windows = self.windows.lock().expect("rate limiter mutex poisoned");
        let carried: HashMap<Key, Window> = old_windows
            .iter()
            .map(|(k, w)| {
                (
                    k.clone(),
                    Window {
                        timestamps: w.timestamps.clone(),
                    },
                )
            })
            .collect();
        RateLimiter {
            limits: new_limits,
            windows: Mutex::new(carried),
        }
    }

    fn matching_limit(&self, tool: &str) -> Option<&RateLimit> {
        // Most specific (literal) match wins over wildcard.
        self.limits
            .iter()
            .find(|rl| matches!(&rl.tool, crate::rules::model::RateLimitSelector::Literal(t) if t == tool))
            .or_else(|| self.limits.iter().find(|rl| rl.tool.matches(tool)))
    }

    fn key_for(limit: &RateLimit, tool: &str, session_id: &str) -> Key {
        let scope_key = match limit.scope {
            RateLimitScope::Session => session_id.to_string(),
            RateLimitScope::Global => "__global__".to_string(),
        };
        Key {
            tool: tool.to_string(),
            scope_key,
        }
    }

    /// Returns `true` if the call is within limits (and should be recorded by
    /// the caller via [`RateLimiter::record`]), `false` if it must be denied.
    pub fn check(&self, tool: &str, session_id: &str) -> bool {
        let Some(limit) = self.matching_limit(tool) else {
            return true;
        };
        if limit.window_seconds <= 0.0 {
            let key = Self::key_for(limit, tool, session_id);
            let windows = self.windows.lock().expect("rate limiter mutex poisoned");
            let count = windows.get(&key).map(|w| w.timestamps.len()).unwrap_or(0);
            return (count as u32) < limit.max_calls;
        }

        let key = Self::key_for(limit, tool, session_id);
        let window_dur = Duration::from_secs_f64(limit.window_seconds);
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        let entry = windows.entry(key).or_insert_with(|| Window {
            timestamps: VecDeque::new(),
        });
        while let Some(&front) = entry.timestamps.front() {
            if now.duration_since(front) > window_dur {
                entry.timestamps.pop_front();
            } else {
                break;
            }
        }
        (entry.timestamps.len() as u32) < limit.max_calls
    }

    pub fn record(&self, tool: &str, session_id: &str) {
        let Some(limit) = self.matching_limit(tool) else {
            return;
        };
        let key = Self::key_for(limit, tool, session_id);
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        windows
            .entry(key)
            .or_insert_with(|| Window {
                timestamps: VecDeque::new(),
            })
            .timestamps
            .push_back(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::model::RateLimitSelector;

    fn limiter(max_calls: u32, window_seconds: f64, scope: RateLimitScope) -> RateLimiter {
        RateLimiter::new(vec![RateLimit {
            tool: RateLimitSelector::Literal("web_fetch".to_string()),
            max_calls,
            window_seconds,
            scope,
        }])
    }

    #[test]
    fn allows_up_to_max_calls_then_denies() {
        let rl = limiter(10, 60.0, RateLimitScope::Session);
        for _ in 0..10 {
            assert!(rl.check("web_fetch", "s1"));
            rl.record("web_fetch", "s1");
        }
        assert!(!rl.check("web_fetch", "s1"));
    }

    #[test]
    fn sessions_are_independent() {
        let rl = limiter(10, 60.0, RateLimitScope::Session);
        for _ in 0..10 {
            rl.record("web_fetch", "s1");
        }
        assert!(!rl.check("web_fetch", "s1"));
        assert!(rl.check("web_fetch", "s2"));
    }

    #[test]
    fn global_scope_shares_across_sessions() {
        let rl = limiter(5, 60.0, RateLimitScope::Global);
        for i in 0..5 {
            rl.record("web_fetch", &format!("s{i}"));
        }
        assert!(!rl.check("web_fetch", "s-new"));
    }

    #[test]
    fn window_expiry_resets_count() {
        let rl = limiter(1, 0.05, RateLimitScope::Session);
        rl.record("web_fetch", "s1");
        assert!(!rl.check("web_fetch", "s1"));
        std::thread::sleep(Duration::from_millis(80));
        assert!(rl.check("web_fetch", "s1"));
    }
}
