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

//! Sanitizer: pre-match shape validation and built-in threat detectors (§4.2).
//! Runs before the matcher; rejection synthesizes a BLOCK verdict so the
//! engine never even has to consult the rule-set.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    pub max_depth: usize,
    pub max_string_len: usize,
    pub detect_path_traversal: bool,
    pub detect_shell_injection: bool,
    pub detect_sql_injection: bool,
    pub detect_ssrf: bool,
    pub allow_private_ranges: bool,
    pub blocked_url_schemes: Vec<String>,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_string_len: 64 * 1024,
            detect_path_traversal: true,
            detect_shell_injection: true,
            detect_sql_injection: true,
            detect_ssrf: true,
            allow_private_ranges: false,
            blocked_url_schemes: vec!["file".to_string(), "gopher".to_string()],
        }
    }
}

static TOOL_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.\-]+$").unwrap());
static SHELL_INJECTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[`;]|&&|\|\||\$\(").unwrap());
static SQL_INJECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\bunion\b\s+\bselect\b|--\s|/\*|\bor\b\s+1\s*=\s*1|;\s*drop\s+table)").unwrap()
});
static SSRF_METADATA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"169\.254\.169\.254|metadata\.google\.internal").unwrap()
});
static SSRF_PRIVATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(localhost|127\.0\.0\.1|10\.\d+\.\d+\.\d+|192\.168\.\d+\.\d+|172\.(1[6-9]|2\d|3[01])\.\d+\.\d+)").unwrap()
});

/// A rejection carries the detector name so the verdict builder can attribute it.
#[derive(Debug, Clone)]
pub struct SanitizerRejection {
    pub detector: String,
    pub detail: String,
}

pub fn validate_tool_name(name: &str) -> Result<(), SanitizerRejection> {
    if name.is_empty() || name.len() > 256 || !TOOL_NAME_RE.is_match(name) {
        return Err(SanitizerRejection {
            detector: "tool_name_shape".to_string(),
            detail: format!("tool name '{name}' fails shape validation"),
        });
    }
    Ok(())
}

pub fn sanitize(args: &serde_json::Value, config: &SanitizerConfig) -> Result<(), SanitizerRejection> {
    check_depth(args, 0, config.max_depth)?;
    check_strings(args, config)?;
    Ok(())
}

fn check_depth(value: &serde_json::Value, depth: usize, max_depth: usize) -> Result<(), SanitizerRejection> {
    if depth > max_depth {
        return Err(SanitizerRejection {
            detector: "depth_limit".to_string(),
            detail: format!("args tree exceeds max depth {max_depth}"),
        });
    }
    match value {
        serde_json::Value::Object(map) => {
            for v in map.values() {
                check_depth(v, depth + 1, max_depth)?;
            }
        }
        serde_json::Value::Array(items) => {
            for v in items {
                check_depth(v, depth + 1, max_depth)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn check_strings(value: &serde_json::Value, config: &SanitizerConfig) -> Result<(), SanitizerRejection> {
    match value {
        serde_json::Value::String(s) => check_string_value(s, config),
        serde_json::Value::Object(map) => {
            for v in map.values() {
                check_strings(v, config)?;
            }
            Ok(())
        }
        serde_json::Value::Array(items) => {
            for v in items {
                check_strings(v, config)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn check_string_value(s: &str, config: &SanitizerConfig) -> Result<(), SanitizerRejection> {
    if s.len() > config.max_string_len {
        return Err(SanitizerRejection {
            detector: "string_length_limit".to_string(),
            detail: format!("string value exceeds {} bytes", config.max_string_len),
        });
    }

    if config.detect_path_traversal && contains_path_traversal(s) {
        return Err(SanitizerRejection {
            detector: "path_traversal".to_string(),
            detail: "path traversal segment detected".to_string(),
        });
    }

    if config.detect_shell_injection && SHELL_INJECTION_RE.is_match(s) {
        return Err(SanitizerRejection {
            detector: "shell_injection".to_string(),
            detail: "shell metacharacter sequence detected".to_string(),
        });
    }

    if config.detect_sql_injection && SQL_INJECTION_RE.is_match(s) {
        return Err(SanitizerRejection {
            detector: "sql_injection".to_string(),
            detail: "SQL injection pattern detected".to_string(),
        });
    }

    if config.detect_ssrf && contains_ssrf_target(s, config.allow_private_ranges) {
        return Err(SanitizerRejection {
            detector: "ssrf".to_string(),
            detail: "request targets a metadata or internal address".to_string(),
        });
    }

    if let Some(scheme) = extract_url_scheme(s) {
        if config.blocked_url_schemes.iter().any(|blocked| blocked == &scheme) {
            return Err(SanitizerRejection {
                detector: "blocked_url_scheme".to_string(),
                detail: format!("URL scheme '{scheme}' is blocked"),
            });
        }
    }

    Ok(())
}

fn contains_path_traversal(s: &str) -> bool {
    s.split(['/', '\\']).any(|segment| segment == "..")
}

fn contains_ssrf_target(s: &str, allow_private: bool) -> bool {
    if SSRF_METADATA_RE.is_match(s) {
        return true;
    }
    if !allow_private && SSRF_PRIVATE_RE.is_match(s) {
        return true;
    }
    false
}

fn extract_url_scheme(s: &str) -> Option<String> {
    s.split_once("://").map(|(scheme, _)| scheme.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_path_traversal() {
        let config = SanitizerConfig::default();
        let args = serde_json::json!({"path": "../../etc/passwd"});
        assert!(sanitize(&args, &config).is_err());
    }

    #[test]
    fn rejects_shell_metacharacters() {
        let config = SanitizerConfig::default();
        let args = serde_json::json!({"command": "ls; rm -rf /"});
        assert!(sanitize(&args, &config).is_err());
    }

    #[test]
    fn rejects_metadata_ssrf() {
        let config = SanitizerConfig::default();
        let args = serde_json::json!({"url": "http://169.254.169.254/latest/meta-data"});
        assert!(sanitize(&args, &config).is_err());
    }

    #[test]
    fn rejects_blocked_scheme() {
        let config = SanitizerConfig::default();
        let args = serde_json::json!({"url": "file:///etc/passwd"});
        assert!(sanitize(&args, &config).is_err());
    }

    #[test]
    fn allows_benign_args() {
        let config = SanitizerConfig::default();
        let args = serde_json::json!({"command": "ls -la", "path": "/tmp/output.txt"});
        assert!(sanitize(&args, &config).is_ok());
    }

    #[test]
    fn tool_name_shape_validation() {
        assert!(validate_tool_name("send_message").is_ok());
        assert!(validate_tool_name("bad name!").is_err());
        assert!(validate_tool_name("").is_err());
    }
}
