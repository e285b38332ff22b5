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

//! PII detector: scans strings/dicts for built-in and custom patterns, masks
//! matched substrings (§4.3). Checksum-gated types never report a match whose
//! checksum fails — this is a correctness property, not an optimization.

use crate::pii::patterns::builtin_patterns;
use crate::rules::model::CustomPiiPattern;
use crate::types::PiiType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiiMatch {
    pub pii_type: PiiType,
    pub field_path: String,
    pub start: usize,
    pub end: usize,
}

pub struct PiiDetector<'a> {
    custom_patterns: &'a [CustomPiiPattern],
}

impl<'a> PiiDetector<'a> {
    pub fn new(custom_patterns: &'a [CustomPiiPattern]) -> Self {
        Self { custom_patterns }
    }

    /// Scans a single string, returning every match found (built-in then custom).
    pub fn scan(&self, text: &str) -> Vec<PiiMatch> {
        self.scan_at(text, "")
    }

    fn scan_at(&self, text: &str, field_path: &str) -> Vec<PiiMatch> {
        let mut matches = Vec::new();

        for pattern in builtin_patterns() {
            for m in pattern.regex.find_iter(text) {
                let candidate = m.as_str();
                if let Some(checksum) = pattern.checksum {
                    if !checksum(candidate) {
                        continue;
                    }
                }
                matches.push(PiiMatch {
                    pii_type: pattern.pii_type.clone(),
                    field_path: field_path.to_string(),
                    start: m.start(),
                    end: m.end(),
                });
            }
        }

        for custom in self.custom_patterns {
            for m in custom.pattern.find_iter(text) {
                matches.push(PiiMatch {
                    pii_type: PiiType::Custom(custom.label.clone()),
                    field_path: field_path.to_string(),
                    start: m.start(),
                    end: m.end(),
                });
            }
        }

        matches
    }

    /// Recursively scans a JSON value, tracking dotted field paths.
    pub fn scan_value(&self, value: &serde_json::Value) -> Vec<PiiMatch> {
        let mut out = Vec::new();
        self.scan_value_at(value, "", &mut out);
        out
    }

    fn scan_value_at(&self, value: &serde_json::Value, path: &str, out: &mut Vec<PiiMatch>) {
        match value {
            serde_json::Value::String(s) => out.extend(self.scan_at(s, path)),
            serde_json::Value::Object(map) => {
                for (k, v) in map {
                    let child_path = if path.is_empty() {
                        k.clone()
                    } else {
                        format!("{path}.{k}")
                    };
                    self.scan_value_at(v, &child_path, out);
                }
            }
            serde_json::Value::Array(items) => {
                for (i, v) in items.iter().enumerate() {
                    let child_path = format!("{path}[{i}]");
                    self.scan_value_at(v, &child_path, out);
                }
            }
            _ => {}
        }
    }

    /// Returns a deep copy of `value` with every matched substring replaced
    /// by its type-specific mask.
    pub fn mask_value(&self, value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::String(s) => serde_json::Value::String(self.mask_string(s)),
            serde_json::Value::Object(map) => {
                let masked = map
                    .iter()
                    .map(|(k, v)| (k.clone(), self.mask_value(v)))
                    .collect();
                serde_json::Value::Object(masked)
            }
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(|v| self.mask_value(v)).collect())
            }
            other => other.clone(),
        }
    }

    pub fn mask_string(&self, text: &str) -> String {
        let mut spans: Vec<(usize, usize, String)> = Vec::new();

        for pattern in builtin_patterns() {
            for m in pattern.regex.find_iter(text) {
                let candidate = m.as_str();
                if let Some(checksum) = pattern.checksum {
                    if !checksum(candidate) {
                        continue;
                    }
                }
                spans.push((m.start(), m.end(), (pattern.mask)(candidate)));
            }
        }
        for custom in self.custom_patterns {
            for m in custom.pattern.find_iter(text) {
                let masked = "*".repeat(m.as_str().chars().count());
                spans.push((m.start(), m.end(), masked));
            }
        }

        if spans.is_empty() {
            return text.to_string();
        }
        spans.sort_by_key(|(start, _, _)| *start);

        let mut result = String::with_capacity(text.len());
        let mut cursor = 0usize;
        for (start, end, masked) in spans {
            if start < cursor {
                continue; // overlapping match, keep the first
            }
            result.push_str(&text[cursor..start]);
            result.push_str(&masked);
            cursor = end;
        }
        result.push_str(&text[cursor..]);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_email() {
        let detector = PiiDetector::new(&[]);
        let matches = detector.scan("contact john@corp.com today");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].pii_type, PiiType::Email);
    }

    #[test]
    fn masks_email_exactly() {
        let detector = PiiDetector::new(&[]);
        let masked = detector.mask_value(&serde_json::json!({"text": "contact john@corp.com"}));
        assert_eq!(masked["text"], serde_json::json!("contact j***@c***.com"));
    }

    #[test]
    fn rejects_credit_card_with_bad_checksum() {
        let detector = PiiDetector::new(&[]);
        let matches = detector.scan("card 4111111111111112 is invalid");
        assert!(matches.iter().all(|m| m.pii_type != PiiType::CreditCard));
    }

    #[test]
    fn accepts_credit_card_with_valid_checksum() {
        let detector = PiiDetector::new(&[]);
        let matches = detector.scan("card 4111111111111111 on file");
        assert!(matches.iter().any(|m| m.pii_type == PiiType::CreditCard));
    }

    #[test]
    fn custom_pattern_tags_label() {
        let custom = vec![CustomPiiPattern {
            label: "internal_id".to_string(),
            pattern: regex::Regex::new(r"EMP-\d{4}").unwrap(),
        }];
        let detector = PiiDetector::new(&custom);
        let matches = detector.scan("employee EMP-1234 reassigned");
        assert_eq!(matches[0].pii_type, PiiType::Custom("internal_id".to_string()));
    }
}
