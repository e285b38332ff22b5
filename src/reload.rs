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

//! Hot-reload watcher: polls the rules path for `*.yaml`/`*.yml` file
//! changes (by mtime+size) and triggers the engine's `reload` on any change
//! (§4.10). Runs on a dedicated background worker, started explicitly and
//! stopped by the engine's shutdown sequence.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::engine::ShieldEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileFingerprint {
    mtime: std::time::SystemTime,
    size: u64,
}

pub struct HotReloadWatcher {
    path: PathBuf,
    poll_interval: Duration,
}

impl HotReloadWatcher {
    pub fn new(path: PathBuf, poll_interval: Duration) -> Self {
        Self { path, poll_interval }
    }

    /// Spawns the polling loop. Returns a `watch::Sender<bool>` the caller
    /// can flip to request shutdown (§5 "Graceful shutdown" step 3).
    pub fn spawn(self, engine: Arc<ShieldEngine>) -> (tokio::task::JoinHandle<()>, watch::Sender<bool>) {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut fingerprints: HashMap<PathBuf, FileFingerprint> = HashMap::new();
            let mut ticker = tokio::time::interval(self.poll_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.poll_once(&engine, &mut fingerprints).await;
                    }
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            info!("hot-reload watcher stopping");
                            break;
                        }
                    }
                }
            }
        });
        (handle, stop_tx)
    }

    async fn poll_once(&self, engine: &Arc<ShieldEngine>, fingerprints: &mut HashMap<PathBuf, FileFingerprint>) {
        let entries = match self.scan_rule_files() {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, path = %self.path.display(), "failed to list rules path");
                return;
            }
        };

        let mut changed = false;
        for (path, fingerprint) in &entries {
            match fingerprints.get(path) {
                Some(prev) if prev == fingerprint => {}
                _ => {
                    changed = true;
                    fingerprints.insert(path.clone(), *fingerprint);
                }
            }
        }
        fingerprints.retain(|path, _| entries.iter().any(|(p, _)| p == path));

        if !changed {
            return;
        }

        debug!(path = %self.path.display(), "rule file change detected, recompiling");
        match engine.reload(&self.path).await {
            Ok(ruleset) => info!(hash = %ruleset.content_hash, "hot reload succeeded"),
            Err(e) => error!(error = %e, "hot reload failed, keeping previous rule-set in service"),
        }
    }

    fn scan_rule_files(&self) -> std::io::Result<Vec<(PathBuf, FileFingerprint)>> {
        let mut out = Vec::new();
        if self.path.is_dir() {
            for entry in std::fs::read_dir(&self.path)? {
                let entry = entry?;
                let path = entry.path();
                if is_yaml(&path) {
                    out.push((path.clone(), fingerprint_of(&path)?));
                }
            }
        } else if is_yaml(&self.path) {
            out.push((self.path.clone(), fingerprint_of(&self.path)?));
        }
        Ok(out)
    }
}

fn is_yaml(path: &std::path::Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml"))
}

fn fingerprint_of(path: &std::path::Path) -> std::io::Result<FileFingerprint> {
    let meta = std::fs::metadata(path)?;
    Ok(FileFingerprint {
        mtime: meta.modified()?,
        size: meta.len(),
    })
}
