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

//! Trace recorder: append-only JSONL, one file per UTC date, batched and
//! flushed on buffer-full / `flush()` / shutdown (§4.8). Resilient to disk
//! errors — write failures are logged, never raised out of the recorder.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::error;

use crate::types::{PiiType, Verdict};

#[derive(Debug, Clone, Serialize)]
pub struct TraceApproval {
    pub status: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub channel: Option<String>,
    pub response_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "session")]
    pub session_id: String,
    pub tool: String,
    pub verdict: Verdict,
    #[serde(rename = "rule")]
    pub rule_id: Option<String>,
    #[serde(rename = "pii")]
    pub pii_types: Vec<PiiType>,
    pub latency_ms: f64,
    pub args_hash: Option<String>,
    pub args: Option<serde_json::Value>,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval: Option<TraceApproval>,
}

#[derive(Debug, Clone)]
pub struct TraceConfig {
    pub dir: PathBuf,
    pub privacy_mode: bool,
    pub batch_size: usize,
    pub buffer_cap: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./traces"),
            privacy_mode: false,
            batch_size: 100,
            buffer_cap: 10_000,
        }
    }
}

struct OpenFile {
    date: chrono::NaiveDate,
    file: File,
}

struct Inner {
    buffer: VecDeque<TraceRecord>,
    open_file: Option<OpenFile>,
}

pub struct TraceRecorder {
    config: TraceConfig,
    inner: Mutex<Inner>,
}

impl TraceRecorder {
    pub fn new(config: TraceConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                buffer: VecDeque::new(),
                open_file: None,
            }),
        }
    }

    /// Records one trace entry, replacing `args` with `args_hash` when
    /// `privacy_mode` is enabled. Flushes automatically once the buffer
    /// reaches `batch_size`.
    pub fn record(&self, mut record: TraceRecord) {
        if self.config.privacy_mode {
            if let Some(args) = record.args.take() {
                record.args_hash = Some(canonical_hash(&args));
            }
        }

        let mut inner = self.inner.lock().expect("trace recorder mutex poisoned");
        inner.buffer.push_back(record);
        while inner.buffer.len() > self.config.buffer_cap {
            inner.buffer.pop_front();
        }
        if inner.buffer.len() >= self.config.batch_size {
            self.flush_locked(&mut inner);
        }
    }

    pub fn flush(&self) {
        let mut inner = self.inner.lock().expect("trace recorder mutex poisoned");
        self.flush_locked(&mut inner);
    }

    fn flush_locked(&self, inner: &mut Inner) {
        if inner.buffer.is_empty() {
            return;
        }
        let today = Utc::now().date_naive();
        let needs_new_file = match &inner.open_file {
            Some(f) => f.date != today,
            None => true,
        };
        if needs_new_file {
            match open_trace_file(&self.config.dir, today) {
                Ok(file) => inner.open_file = Some(OpenFile { date: today, file }),
                Err(e) => {
                    error!(error = %e, "failed to open trace file, dropping buffered records");
                    inner.buffer.clear();
                    return;
                }
            }
        }

        let Some(open_file) = inner.open_file.as_mut() else {
            return;
        };
        while let Some(record) = inner.buffer.pop_front() {
            match serde_json::to_string(&record) {
                Ok(line) => {
                    if let Err(e) = writeln!(open_file.file, "{line}") {
                        error!(error = %e, "trace write failed, record dropped");
                    }
                }
                Err(e) => error!(error = %e, "trace record failed to serialize, dropped"),
            }
        }
    }
}

fn open_trace_file(dir: &std::path::Path, date: chrono::NaiveDate) -> std::io::Result<File> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("shield_trace_{}.jsonl", date.format("%Y-%m-%d")));
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

fn canonical_hash(value: &serde_json::Value) -> String {
    // Canonical form: recursively sort object keys so the hash is stable
    // regardless of field insertion order.
    let canonical = sort_keys(value);
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn sort_keys(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for k in keys {
                sorted.insert(k.clone(), sort_keys(&map[k]));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(session: &str) -> TraceRecord {
        TraceRecord {
            timestamp: Utc::now(),
            session_id: session.to_string(),
            tool: "exec".to_string(),
            verdict: Verdict::Allow,
            rule_id: None,
            pii_types: Vec::new(),
            latency_ms: 1.2,
            args_hash: None,
            args: Some(serde_json::json!({"b": 1, "a": 2})),
            request_id: "req-1".to_string(),
            approval: None,
        }
    }

    #[test]
    fn privacy_mode_replaces_args_with_hash() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = TraceRecorder::new(TraceConfig {
            dir: dir.path().to_path_buf(),
            privacy_mode: true,
            batch_size: 1,
            buffer_cap: 10,
        });
        recorder.record(record("s1"));
        recorder.flush();

        let contents = std::fs::read_to_string(
            dir.path().join(format!("shield_trace_{}.jsonl", Utc::now().format("%Y-%m-%d"))),
        )
        .unwrap();
        assert!(contents.contains("args_hash"));
        assert!(!contents.contains("\"args\":{"));
    }

    #[test]
    fn canonical_hash_is_order_independent() {
        let a = canonical_hash(&serde_json::json!({"a": 1, "b": 2}));
        let b = canonical_hash(&serde_json::json!({"b": 2, "a": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn flush_creates_file_and_drains_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = TraceRecorder::new(TraceConfig {
            dir: dir.path().to_path_buf(),
            privacy_mode: false,
            batch_size: 100,
            buffer_cap: 10,
        });
        recorder.record(record("s1"));
        recorder.record(record("s2"));
        recorder.flush();
        let path = dir.path().join(format!("shield_trace_{}.jsonl", Utc::now().format("%Y-%m-%d")));
        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
