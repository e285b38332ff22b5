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

//! Thread-safe session store: TTL + LRU map of session state with tool
//! counters, taints and a bounded event ring (§4.4). A single mutex covers
//! the id→state map *and* each state's mutation, matching §5's ownership
//! rule: "Session store: single mutex covers the id→state map and each
//! state's mutation (event ring append, counter increment)."

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::session::ring::{EventRecord, EventRing};
use crate::types::Verdict;

#[derive(Debug, Clone)]
pub struct SessionState {
    pub id: String,
    pub created_at: Instant,
    pub last_accessed: Instant,
    pub tool_counts: HashMap<String, u64>,
    pub total_calls: u64,
    pub taints: HashSet<String>,
    pub pii_tainted: bool,
    pub taint_reason: String,
    pub event_ring: EventRing,
}

impl SessionState {
    fn new(id: String, event_buffer_size: usize) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_accessed: now,
            tool_counts: HashMap::new(),
            total_calls: 0,
            taints: HashSet::new(),
            pii_tainted: false,
            taint_reason: String::new(),
            event_ring: EventRing::new(event_buffer_size),
        }
    }

    pub fn tool_count(&self, tool: &str) -> u64 {
        self.tool_counts.get(tool).copied().unwrap_or(0)
    }
}

/// A read-only copy of session state for the matcher, taken under the store
/// mutex (§4.1: "Session predicates read the snapshot (no mutation during match)").
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: String,
    pub tool_counts: HashMap<String, u64>,
    pub total_calls: u64,
    pub taints: HashSet<String>,
    pub pii_tainted: bool,
    pub taint_reason: String,
    pub event_ring: Vec<EventRecord>,
}

impl SessionSnapshot {
    pub fn tool_count(&self, tool: &str) -> u64 {
        self.tool_counts.get(tool).copied().unwrap_or(0)
    }
}

impl From<&SessionState> for SessionSnapshot {
    fn from(s: &SessionState) -> Self {
        Self {
            id: s.id.clone(),
            tool_counts: s.tool_counts.clone(),
            total_calls: s.total_calls,
            taints: s.taints.clone(),
            pii_tainted: s.pii_tainted,
            taint_reason: s.taint_reason.clone(),
            event_ring: s.event_ring.snapshot(),
        }
    }
}

struct Inner {
    sessions: HashMap<String, SessionState>,
}

pub struct SessionStore {
    inner: Mutex<Inner>,
    ttl: Duration,
    capacity: usize,
    event_buffer_size: usize,
}

impl SessionStore {
    pub fn new(ttl: Duration, capacity: usize, event_buffer_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
            }),
            ttl,
            capacity,
            event_buffer_size,
        }
    }

    fn is_expired(&self, state: &SessionState, now: Instant) -> bool {
        now.duration_since(state.last_accessed) >= self.ttl
    }

    /// Get or create session state, touching `last_accessed`. Evicts a
    /// TTL-expired entry in place; evicts the least-recently-accessed entry
    /// if creating a new one would exceed capacity.
    pub fn get_or_create(&self, session_id: &str) -> SessionSnapshot {
        let mut inner = self.inner.lock().expect("session store mutex poisoned");
        let now = Instant::now();

        let expired = inner
            .sessions
            .get(session_id)
            .map(|s| self.is_expired(s, now))
            .unwrap_or(false);
        if expired {
            inner.sessions.remove(session_id);
            debug!(session_id, "session TTL expired, evicting");
        }

        if !inner.sessions.contains_key(session_id) {
            if inner.sessions.len() >= self.capacity {
                if let Some(lru_id) = inner
                    .sessions
                    .values()
                    .min_by_key(|s| s.last_accessed)
                    .map(|s| s.id.clone())
                {
                    inner.sessions.remove(&lru_id);
                    debug!(evicted = %lru_id, "session store at capacity, evicting LRU entry");
                }
            }
            inner
                .sessions
                .insert(session_id.to_string(), SessionState::new(session_id.to_string(), self.event_buffer_size));
        }

        let state = inner.sessions.get_mut(session_id).expect("just inserted");
        state.last_accessed = now;
        SessionSnapshot::from(&*state)
    }

    /// Opportunistic sweep: drop all TTL-expired entries. Also invoked by the
    /// background sweeper on its own interval (§4.4).
    pub fn sweep_expired(&self) -> usize {
        let mut inner = self.inner.lock().expect("session store mutex poisoned");
        let now = Instant::now();
        let expired: Vec<String> = inner
            .sessions
            .iter()
            .filter(|(_, s)| self.is_expired(s, now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            inner.sessions.remove(id);
        }
        expired.len()
    }

    pub fn record_event(&self, session_id: &str, tool: &str, verdict: Verdict, args: &serde_json::Value) {
        let mut inner = self.inner.lock().expect("session store mutex poisoned");
        if let Some(state) = inner.sessions.get_mut(session_id) {
            *state.tool_counts.entry(tool.to_string()).or_insert(0) += 1;
            state.total_calls += 1;
            state.event_ring.append(EventRecord::new(tool, verdict, args));
        }
    }

    pub fn add_taint(&self, session_id: &str, pii_type: &str) {
        let mut inner = self.inner.lock().expect("session store mutex poisoned");
        if let Some(state) = inner.sessions.get_mut(session_id) {
            state.taints.insert(pii_type.to_string());
        }
    }

    /// Marks the session as tainted with a reason (post-check PII scan, §4.9).
    pub fn set_pii_tainted(&self, session_id: &str, reason: impl Into<String>) {
        let mut inner = self.inner.lock().expect("session store mutex poisoned");
        if let Some(state) = inner.sessions.get_mut(session_id) {
            state.pii_tainted = true;
            state.taint_reason = reason.into();
        }
    }

    /// `/api/v1/clear-taint` — clears the derived taint flag (scenario 6).
    pub fn clear_taint(&self, session_id: &str) -> bool {
        let mut inner = self.inner.lock().expect("session store mutex poisoned");
        if let Some(state) = inner.sessions.get_mut(session_id) {
            state.pii_tainted = false;
            state.taint_reason.clear();
            state.taints.clear();
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        let inner = self.inner.lock().expect("session store mutex poisoned");
        inner.sessions.get(session_id).map(SessionSnapshot::from)
    }

    pub fn active_sessions(&self) -> usize {
        let inner = self.inner.lock().expect("session store mutex poisoned");
        inner.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_count_matches_recorded_events() {
        let store = SessionStore::new(Duration::from_secs(3600), 100, 10);
        store.get_or_create("s1");
        for _ in 0..5 {
            store.record_event("s1", "exec", Verdict::Allow, &serde_json::json!({}));
        }
        let snap = store.snapshot("s1").unwrap();
        assert_eq!(snap.tool_counts.get("exec"), Some(&5));
        assert_eq!(snap.total_calls, 5);
    }

    #[test]
    fn ttl_expiry_replaces_session() {
        let store = SessionStore::new(Duration::from_millis(10), 100, 10);
        store.get_or_create("s1");
        store.record_event("s1", "exec", Verdict::Allow, &serde_json::json!({}));
        std::thread::sleep(Duration::from_millis(30));
        let snap = store.get_or_create("s1");
        assert_eq!(snap.total_calls, 0);
    }

    #[test]
    fn lru_eviction_at_capacity() {
        let store = SessionStore::new(Duration::from_secs(3600), 2, 10);
        store.get_or_create("a");
        std::thread::sleep(Duration::from_millis(5));
        store.get_or_create("b");
        std::thread::sleep(Duration::from_millis(5));
        // "a" is least-recently-accessed; inserting "c" should evict it.
        store.get_or_create("c");
        assert!(store.snapshot("a").is_none());
        assert!(store.snapshot("b").is_some());
        assert!(store.snapshot("c").is_some());
    }

    #[test]
    fn clear_taint_resets_flags() {
        let store = SessionStore::new(Duration::from_secs(3600), 100, 10);
        store.get_or_create("s1");
        store.set_pii_tainted("s1", "post-check match");
        store.add_taint("s1", "EMAIL");
        assert!(store.clear_taint("s1"));
        let snap = store.snapshot("s1").unwrap();
        assert!(!snap.pii_tainted);
        assert!(snap.taints.is_empty());
    }
}
