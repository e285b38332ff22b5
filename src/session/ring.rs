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

//! Fixed-capacity event ring buffer (§3 SessionState.event_ring, §9 design notes).
//! `append` is O(1); overflow drops the oldest entry.

use std::collections::VecDeque;
use std::time::SystemTime;

use crate::types::Verdict;

const ARGS_SUMMARY_MAX_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct EventRecord {
    pub tool: String,
    pub timestamp: SystemTime,
    pub verdict: Verdict,
    pub args_summary: String,
}

impl EventRecord {
    pub fn new(tool: impl Into<String>, verdict: Verdict, args: &serde_json::Value) -> Self {
        let mut summary = args.to_string();
        if summary.len() > ARGS_SUMMARY_MAX_LEN {
            summary.truncate(ARGS_SUMMARY_MAX_LEN);
        }
        Self {
            tool: tool.into(),
            timestamp: SystemTime::now(),
            verdict,
            args_summary: summary,
        }
    }
}

/// A bounded circular buffer of recent tool-call events for one session.
#[derive(Debug, Clone)]
pub struct EventRing {
    capacity: usize,
    entries: VecDeque<EventRecord>,
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn append(&mut self, record: EventRecord) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A stable snapshot for matcher consumption — copied under the session
    /// mutex, acceptable given the small bounded N (§9 design notes).
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.entries.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(tool: &str) -> EventRecord {
        EventRecord::new(tool, Verdict::Allow, &serde_json::json!({}))
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut ring = EventRing::new(3);
        for i in 0..10 {
            ring.append(rec(&format!("tool{i}")));
        }
        assert_eq!(ring.len(), 3);
        let snap = ring.snapshot();
        assert_eq!(snap[0].tool, "tool7");
        assert_eq!(snap[2].tool, "tool9");
    }

    #[test]
    fn args_summary_truncated() {
        let big = serde_json::json!({ "x": "a".repeat(1000) });
        let r = EventRecord::new("t", Verdict::Allow, &big);
        assert_eq!(r.args_summary.len(), ARGS_SUMMARY_MAX_LEN);
    }
}
