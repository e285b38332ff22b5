use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;

use policyshield::matcher::{find_best_match, MatchContext};
use policyshield::pii::PiiDetector;
use policyshield::rules::compiler;
use policyshield::session::SessionStore;

const RULES: &str = r#"
shield_name: bench-shield
version: "1"
default_verdict: allow
rules:
  - id: no-rm
    when:
      tool: exec
      args_match:
        command: { regex: "rm\\s+-rf" }
    then: block
  - id: pii-redact
    when:
      tool: send_message
    then: redact
  - id: gate-deploy
    when:
      tool: deploy
      session:
        tool_count.deploy: { gte: 3 }
    then: approve
  - id: no-exfil
    when:
      tool: send_email
      chain:
        - tool: read_database
          within_seconds: 60
    then: block
"#;

fn bench_matcher_hit(c: &mut Criterion) {
    let ruleset = compiler::compile_str(RULES).expect("rule-set must compile");
    let store = SessionStore::new(Duration::from_secs(3600), 10_000, 100);
    let session = store.get_or_create("bench-session");
    let args = serde_json::json!({"command": "rm -rf /var/lib/data"});
    let context = std::collections::HashMap::new();

    c.bench_function("matcher_find_best_match_hit", |b| {
        b.iter(|| {
            let ctx = MatchContext {
                tool: "exec",
                args: black_box(&args),
                session: &session,
                sender: None,
                context: &context,
                pii_detected: false,
            };
            let _ = find_best_match(&ruleset, black_box(&ctx));
        })
    });
}

fn bench_matcher_miss(c: &mut Criterion) {
    let ruleset = compiler::compile_str(RULES).expect("rule-set must compile");
    let store = SessionStore::new(Duration::from_secs(3600), 10_000, 100);
    let session = store.get_or_create("bench-session");
    let args = serde_json::json!({"path": "/tmp/report.csv"});
    let context = std::collections::HashMap::new();

    c.bench_function("matcher_find_best_match_miss", |b| {
        b.iter(|| {
            let ctx = MatchContext {
                tool: "read_file",
                args: black_box(&args),
                session: &session,
                sender: None,
                context: &context,
                pii_detected: false,
            };
            let _ = find_best_match(&ruleset, black_box(&ctx));
        })
    });
}

fn bench_pii_scan(c: &mut Criterion) {
    let detector = PiiDetector::new(&[]);
    let text = "Contact john.doe@example.com or call +1 415-555-0100, card 4111111111111111, \
                SSN 123-45-6789, from 10.0.0.42. Unrelated filler text repeated to pad the input \
                out to something closer to a real tool-call argument payload.";

    c.bench_function("pii_scan_mixed_types", |b| {
        b.iter(|| {
            let _ = detector.scan(black_box(text));
        })
    });
}

fn bench_pii_mask(c: &mut Criterion) {
    let detector = PiiDetector::new(&[]);
    let value = serde_json::json!({
        "text": "Contact john.doe@example.com or call +1 415-555-0100",
        "notes": "card on file: 4111111111111111",
    });

    c.bench_function("pii_mask_value", |b| {
        b.iter(|| {
            let _ = detector.mask_value(black_box(&value));
        })
    });
}

criterion_group!(benches, bench_matcher_hit, bench_matcher_miss, bench_pii_scan, bench_pii_mask);
criterion_main!(benches);
