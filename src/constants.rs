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

//! PolicyShield constants — single source of truth for environment variable
//! names and default tunables (§6.4).

/// Environment variable names read by `Config::from_env`.
pub mod env {
    pub const MODE: &str = "POLICYSHIELD_MODE";
    pub const FAIL_OPEN: &str = "POLICYSHIELD_FAIL_OPEN";
    pub const API_TOKEN: &str = "POLICYSHIELD_API_TOKEN";
    pub const ADMIN_TOKEN: &str = "POLICYSHIELD_ADMIN_TOKEN";
    pub const MAX_CONCURRENT_CHECKS: &str = "POLICYSHIELD_MAX_CONCURRENT_CHECKS";
    pub const MAX_REQUEST_SIZE: &str = "POLICYSHIELD_MAX_REQUEST_SIZE";
    pub const REQUEST_TIMEOUT: &str = "POLICYSHIELD_REQUEST_TIMEOUT";
    pub const CHECK_TIMEOUT: &str = "POLICYSHIELD_CHECK_TIMEOUT";
    pub const APPROVAL_TIMEOUT: &str = "POLICYSHIELD_APPROVAL_TIMEOUT";
    pub const APPROVAL_TTL: &str = "POLICYSHIELD_APPROVAL_TTL";
    pub const TRACE_DIR: &str = "POLICYSHIELD_TRACE_DIR";
    pub const TRACE_PRIVACY: &str = "POLICYSHIELD_TRACE_PRIVACY";
    pub const RULES_PATH: &str = "POLICYSHIELD_RULES_PATH";
    pub const LOG_FORMAT: &str = "POLICYSHIELD_LOG_FORMAT";
    pub const LOG_LEVEL: &str = "POLICYSHIELD_LOG_LEVEL";
    pub const CORS_ORIGINS: &str = "POLICYSHIELD_CORS_ORIGINS";
    pub const APPROVAL_WEBHOOK_URL: &str = "POLICYSHIELD_APPROVAL_WEBHOOK_URL";
    pub const BIND_ADDR: &str = "POLICYSHIELD_BIND_ADDR";
}

/// Default tunables (§4.11, §5, §6.4) used when the corresponding env var is absent.
pub mod defaults {
    use std::time::Duration;

    pub const MODE: &str = "enforce";
    pub const BIND_ADDR: &str = "0.0.0.0:8080";
    pub const MAX_CONCURRENT_CHECKS: usize = 100;
    pub const MAX_REQUEST_SIZE_BYTES: usize = 1024 * 1024;
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const CHECK_TIMEOUT: Duration = Duration::from_secs(5);
    pub const APPROVAL_TIMEOUT: Duration = Duration::from_secs(300);
    pub const APPROVAL_TTL: Duration = Duration::from_secs(3600);
    pub const SESSION_TTL: Duration = Duration::from_secs(3600);
    pub const SESSION_CAPACITY: usize = 10_000;
    pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
    pub const TRACE_BATCH_SIZE: usize = 100;
    pub const TRACE_BUFFER_CAP: usize = 10_000;
    pub const RULES_POLL_INTERVAL: Duration = Duration::from_secs(2);
    pub const ADMIN_RATE_LIMIT_PER_MIN: u32 = 10;
    pub const AUTH_FAIL_RATE_LIMIT_PER_MIN: u32 = 5;
    pub const AUTH_FAIL_LOCKOUT: Duration = Duration::from_secs(5 * 60);
    pub const IDEMPOTENCY_CACHE_CAPACITY: u64 = 10_000;
    pub const IDEMPOTENCY_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
    pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);
}
