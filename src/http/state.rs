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

//! Shared application state handed to every Axum handler (§4.11).

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::Config;
use crate::engine::ShieldEngine;
use crate::http::auth::AuthGuard;
use crate::http::idempotency::IdempotencyCache;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ShieldEngine>,
    pub config: Arc<Config>,
    /// Global admission concurrency limit (§4.11 "Limits").
    pub admission: Arc<Semaphore>,
    pub auth: Arc<AuthGuard>,
    pub idempotency: Arc<IdempotencyCache>,
}

impl AppState {
    pub fn new(engine: Arc<ShieldEngine>, config: Arc<Config>) -> Self {
        let admission = Arc::new(Semaphore::new(config.max_concurrent_checks));
        Self {
            auth: Arc::new(AuthGuard::new(config.api_token.clone(), config.admin_token.clone())),
            idempotency: Arc::new(IdempotencyCache::new(
                crate::constants::defaults::IDEMPOTENCY_CACHE_CAPACITY,
                crate::constants::defaults::IDEMPOTENCY_CACHE_TTL,
            )),
            engine,
            config,
            admission,
        }
    }
}
