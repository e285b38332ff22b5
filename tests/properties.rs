//! Property tests for the invariants the engine's core pieces must hold
//! regardless of input shape: masking never changes a string's length,
//! checksum-gated PII types never report a match whose checksum fails,
//! and rule-set compilation rejects duplicate ids no matter what else the
//! YAML contains.

use proptest::prelude::*;

use policyshield::pii::PiiDetector;
use policyshield::pii::patterns::luhn_checksum;
use policyshield::rules::compiler;
use policyshield::sanitizer::{self, SanitizerConfig};

proptest! {
    #[test]
    fn masking_preserves_string_length(s in "[ -~]{0,200}") {
        let detector = PiiDetector::new(&[]);
        let masked = detector.mask_string(&s);
        prop_assert_eq!(masked.len(), s.len());
    }

    #[test]
    fn masking_is_idempotent_on_already_masked_text(s in "[ -~]{0,200}") {
        let detector = PiiDetector::new(&[]);
        let once = detector.mask_string(&s);
        let twice = detector.mask_string(&once);
        prop_assert_eq!(once, twice);
    }

    /// Any 16-digit string the Luhn check rejects must never surface as a
    /// CreditCard match, whatever other digits surround it.
    #[test]
    fn credit_card_detection_respects_luhn(digits in "[0-9]{16}") {
        let passes_luhn = luhn_checksum(&digits);
        let detector = PiiDetector::new(&[]);
        let matches = detector.scan(&format!("card {digits} on file"));
        let reported = matches.iter().any(|m| m.pii_type == policyshield::types::PiiType::CreditCard);
        if reported {
            prop_assert!(passes_luhn);
        }
    }

    #[test]
    fn sanitizer_never_panics_on_arbitrary_strings(s in ".{0,500}") {
        let config = SanitizerConfig::default();
        let args = serde_json::json!({ "value": s });
        let _ = sanitizer::sanitize(&args, &config);
    }

    #[test]
    fn tool_name_shape_rejects_anything_outside_word_chars(name in "[^\\w.\\-]{1,20}") {
        // A string drawn entirely from characters outside [\w.-] can never
        // satisfy the tool-name shape regex.
        prop_assert!(sanitizer::validate_tool_name(&name).is_err());
    }
}

#[test]
fn duplicate_rule_ids_are_rejected_regardless_of_rule_shape() {
    let yaml = r#"
shield_name: prop-shield
version: "1"
default_verdict: allow
rules:
  - id: dup
    when:
      tool: exec
    then: block
  - id: dup
    when:
      tool: deploy
    then: approve
"#;
    let err = compiler::compile_str(yaml).expect_err("duplicate ids must fail to compile");
    assert!(err.to_string().contains("duplicate rule id"));
}

#[test]
fn reload_is_rejected_when_new_ruleset_has_duplicate_ids() {
    // A syntactically valid rule-set with unique ids compiles fine...
    let good = r#"
shield_name: prop-shield
version: "1"
default_verdict: allow
rules:
  - id: only-rule
    when:
      tool: exec
    then: block
"#;
    assert!(compiler::compile_str(good).is_ok());

    // ...but swapping in a second rule with the same id never compiles,
    // which is what backs the engine's atomic-reload guarantee (a bad
    // rule-set must never replace a good one).
    let bad = r#"
shield_name: prop-shield
version: "1"
default_verdict: allow
rules:
  - id: only-rule
    when:
      tool: exec
    then: block
  - id: only-rule
    when:
      tool: deploy
    then: approve
"#;
    assert!(compiler::compile_str(bad).is_err());
}
