use crossbar_core::{BatchEventPatternMatcher, EventPatternMatcher};

#[test]
fn exact_pattern_matches_only_itself() {
    let matcher = EventPatternMatcher::new("finance/transaction/completed");
    assert!(matcher.matches("finance/transaction/completed"));
    assert!(!matcher.matches("finance/transaction/failed"));
    assert!(!matcher.matches("finance/transaction"));
    assert!(!matcher.matches("finance/transaction/completed/extra"));
}

#[test]
fn catch_all_matches_everything() {
    let matcher = EventPatternMatcher::new("#");
    assert!(matcher.matches(""));
    assert!(matcher.matches("a"));
    assert!(matcher.matches("finance/transaction/completed"));
    assert!(matcher.matches("/"));
}

#[test]
fn empty_pattern_matches_only_empty_type() {
    let matcher = EventPatternMatcher::new("");
    assert!(matcher.matches(""));
    assert!(!matcher.matches("a"));
    assert!(!matcher.matches("/"));
}

#[test]
fn star_matches_exactly_one_segment() {
    let matcher = EventPatternMatcher::new("finance/*/completed");
    assert!(matcher.matches("finance/transaction/completed"));
    assert!(matcher.matches("finance/refund/completed"));
    // Wrong segment count: `*` is single-segment only
    assert!(!matcher.matches("finance/a/b/completed"));
    assert!(!matcher.matches("finance/completed"));
}

#[test]
fn star_matches_an_empty_segment() {
    let matcher = EventPatternMatcher::new("a/*/b");
    assert!(matcher.matches("a//b"));
    assert!(matcher.matches("a/x/b"));
}

#[test]
fn combined_wildcards_in_one_pattern() {
    let matcher = EventPatternMatcher::new("*/transaction/*");
    assert!(matcher.matches("finance/transaction/completed"));
    assert!(matcher.matches("hr/transaction/started"));
    // Four segments against a three-segment pattern
    assert!(!matcher.matches("finance/transaction/audit/completed"));
}

#[test]
fn trailing_hash_matches_zero_or_more_segments() {
    let matcher = EventPatternMatcher::new("finance/#");
    assert!(matcher.matches("finance"));
    assert!(matcher.matches("finance/a"));
    assert!(matcher.matches("finance/a/b/c"));
    assert!(!matcher.matches("fin"));
    assert!(!matcher.matches("hr/finance"));
}

#[test]
fn hash_before_final_position_is_literal() {
    let matcher = EventPatternMatcher::new("a/#/b");
    assert!(matcher.matches("a/#/b"));
    assert!(!matcher.matches("a/x/b"));
    assert!(!matcher.matches("a/b"));
}

#[test]
fn special_characters_match_literally() {
    let matcher = EventPatternMatcher::new("a.b/c+d");
    assert!(matcher.matches("a.b/c+d"));
    // A regex-compiled "." would accept this; the tokenizer must not
    assert!(!matcher.matches("axb/c+d"));

    let matcher = EventPatternMatcher::new("price[usd]/(spot)");
    assert!(matcher.matches("price[usd]/(spot)"));
    assert!(!matcher.matches("price[eur]/(spot)"));
}

#[test]
fn unicode_segments_and_case_sensitivity() {
    let matcher = EventPatternMatcher::new("финансы/取引/*");
    assert!(matcher.matches("финансы/取引/done"));
    assert!(!matcher.matches("Финансы/取引/done"));

    assert!(!EventPatternMatcher::new("finance/x").matches("Finance/x"));
}

#[test]
fn pathological_patterns_never_panic() {
    for pattern in ["[[[", "(((", "a[/b(", "**", "*/*/#/#", "\\", "a{2,}"] {
        let matcher = EventPatternMatcher::new(pattern);
        // Totality: any input produces a boolean
        let _ = matcher.matches("finance/transaction/completed");
        let _ = matcher.matches("");
        assert!(matcher.matches(pattern) || !matcher.matches(pattern));
    }
}

#[test]
fn very_long_patterns_terminate() {
    let deep = vec!["x"; 5000].join("/");
    let matcher = EventPatternMatcher::new(deep.as_str());
    assert!(matcher.matches(&deep));
    assert!(!matcher.matches("x"));

    assert!(EventPatternMatcher::new("#").matches(&deep));
    assert!(EventPatternMatcher::new("x/#").matches(&deep));
}

#[test]
fn pattern_accessor_returns_original_string() {
    let matcher = EventPatternMatcher::new("finance/#");
    assert_eq!(matcher.pattern(), "finance/#");
}

#[test]
fn batch_matches_when_any_pattern_matches() {
    let batch = BatchEventPatternMatcher::new(vec![
        "finance/#".to_string(),
        "hr/*/hired".to_string(),
    ]);
    assert!(batch.matches("finance/transaction/completed"));
    assert!(batch.matches("hr/devs/hired"));
    assert!(!batch.matches("ops/deploy"));
}

#[test]
fn batch_preserves_pattern_order() {
    let patterns = vec!["b/#".to_string(), "a/*".to_string()];
    let batch = BatchEventPatternMatcher::new(patterns.clone());
    assert_eq!(batch.patterns(), patterns.as_slice());
}

#[test]
fn empty_batch_never_matches() {
    let batch = BatchEventPatternMatcher::new(vec![]);
    assert!(!batch.matches("anything"));
    assert!(!batch.matches(""));
}
