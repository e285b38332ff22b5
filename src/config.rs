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

//! Process configuration, read entirely from the environment (§6.4).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{defaults, env as env_names};
use crate::error::ShieldError;
use crate::types::Mode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mode: Mode,
    pub fail_open: bool,
    pub api_token: Option<String>,
    pub admin_token: Option<String>,
    pub max_concurrent_checks: usize,
    pub max_request_size_bytes: usize,
    pub request_timeout: Duration,
    pub check_timeout: Duration,
    pub approval_timeout: Duration,
    pub approval_ttl: Duration,
    pub trace_dir: PathBuf,
    pub trace_privacy: bool,
    pub rules_path: PathBuf,
    pub log_format: String,
    pub log_level: String,
    pub cors_origins: Vec<String>,
    pub approval_webhook_url: Option<String>,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ShieldError> {
        let rules_path = env::var(env_names::RULES_PATH)
            .map(PathBuf::from)
            .map_err(|_| {
                ShieldError::Configuration(format!(
                    "{} is required",
                    env_names::RULES_PATH
                ))
            })?;

        Ok(Self {
            mode: parse_mode(&env_or(env_names::MODE, defaults::MODE))?,
            fail_open: parse_bool(env_names::FAIL_OPEN, false),
            api_token: env::var(env_names::API_TOKEN).ok(),
            admin_token: env::var(env_names::ADMIN_TOKEN).ok(),
            max_concurrent_checks: parse_usize(
                env_names::MAX_CONCURRENT_CHECKS,
                defaults::MAX_CONCURRENT_CHECKS,
            ),
            max_request_size_bytes: parse_usize(
                env_names::MAX_REQUEST_SIZE,
                defaults::MAX_REQUEST_SIZE_BYTES,
            ),
            request_timeout: parse_duration_secs(
                env_names::REQUEST_TIMEOUT,
                defaults::REQUEST_TIMEOUT,
            ),
            check_timeout: parse_duration_secs(env_names::CHECK_TIMEOUT, defaults::CHECK_TIMEOUT),
            approval_timeout: parse_duration_secs(
                env_names::APPROVAL_TIMEOUT,
                defaults::APPROVAL_TIMEOUT,
            ),
            approval_ttl: parse_duration_secs(env_names::APPROVAL_TTL, defaults::APPROVAL_TTL),
            trace_dir: env::var(env_names::TRACE_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./traces")),
            trace_privacy: parse_bool(env_names::TRACE_PRIVACY, false),
            rules_path,
            log_format: env_or(env_names::LOG_FORMAT, "json"),
            log_level: env_or(env_names::LOG_LEVEL, "info"),
            cors_origins: env::var(env_names::CORS_ORIGINS)
                .ok()
                .map(|s| s.split(',').map(|p| p.trim().to_string()).collect())
                .unwrap_or_default(),
            approval_webhook_url: env::var(env_names::APPROVAL_WEBHOOK_URL).ok(),
            bind_addr: env_or(env_names::BIND_ADDR, defaults::BIND_ADDR),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Enforce,
            fail_open: false,
            api_token: None,
            admin_token: None,
            max_concurrent_checks: defaults::MAX_CONCURRENT_CHECKS,
            max_request_size_bytes: defaults::MAX_REQUEST_SIZE_BYTES,
            request_timeout: defaults::REQUEST_TIMEOUT,
            check_timeout: defaults::CHECK_TIMEOUT,
            approval_timeout: defaults::APPROVAL_TIMEOUT,
            approval_ttl: defaults::APPROVAL_TTL,
            trace_dir: PathBuf::from("./traces"),
            trace_privacy: false,
            rules_path: PathBuf::from("./rules.yaml"),
            log_format: "json".to_string(),
            log_level: "info".to_string(),
            cors_origins: Vec::new(),
            approval_webhook_url: None,
            bind_addr: defaults::BIND_ADDR.to_string(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn parse_mode(s: &str) -> Result<Mode, ShieldError> {
    match s.to_lowercase().as_str() {
        "enforce" => Ok(Mode::Enforce),
        "audit" => Ok(Mode::Audit),
        "disabled" => Ok(Mode::Disabled),
        other => Err(ShieldError::Configuration(format!(
            "invalid {}: {other} (expected enforce|audit|disabled)",
            env_names::MODE
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_enforce_mode() {
        assert!(matches!(parse_mode("enforce").unwrap(), Mode::Enforce));
        assert!(matches!(parse_mode("AUDIT").unwrap(), Mode::Audit));
        assert!(parse_mode("bogus").is_err());
    }

    #[test]
    fn bool_parsing_accepts_common_truthy_values() {
        std::env::set_var("POLICYSHIELD_TEST_BOOL", "yes");
        assert!(parse_bool("POLICYSHIELD_TEST_BOOL", false));
        std::env::remove_var("POLICYSHIELD_TEST_BOOL");
    }
}
