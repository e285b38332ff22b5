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

//! `X-Idempotency-Key` cache for `/api/v1/check` (§4.11 "Idempotency").
//! A TTL-bounded LRU keyed on the header value; re-submission returns the
//! cached response byte-for-byte rather than re-running the check pipeline.

use std::time::Duration;

use moka::sync::Cache;

#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

pub struct IdempotencyCache {
    cache: Cache<String, CachedResponse>,
}

impl IdempotencyCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            cache: Cache::builder().max_capacity(max_capacity).time_to_live(ttl).build(),
        }
    }

    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        self.cache.get(key)
    }

    pub fn put(&self, key: String, response: CachedResponse) {
        self.cache.insert(key, response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_key_returns_identical_bytes() {
        let cache = IdempotencyCache::new(10, Duration::from_secs(60));
        cache.put(
            "key-1".to_string(),
            CachedResponse { status: 200, body: b"{\"verdict\":\"ALLOW\"}".to_vec() },
        );
        let first = cache.get("key-1").unwrap();
        let second = cache.get("key-1").unwrap();
        assert_eq!(first.body, second.body);
        assert_eq!(first.status, 200);
    }
}
