use crossbar_core::priority::{
    default_metadata, priority_score, APPROVAL_BOOST, SAFETY_BOOST,
};
use crossbar_core::{EventEnvelope, PriorityLevel};
use serde_json::json;

fn event(event_type: &str, priority: Option<PriorityLevel>) -> EventEnvelope {
    let event = EventEnvelope::new("e1", event_type, json!(null));
    match priority {
        Some(level) => event.with_priority(level),
        None => event,
    }
}

#[test]
fn weights_use_power_of_ten_spacing() {
    assert_eq!(PriorityLevel::Low.weight(), 1);
    assert_eq!(PriorityLevel::Medium.weight(), 10);
    assert_eq!(PriorityLevel::High.weight(), 100);
    assert_eq!(PriorityLevel::Critical.weight(), 1000);
}

#[test]
fn levels_are_ordered() {
    assert!(PriorityLevel::Low < PriorityLevel::Medium);
    assert!(PriorityLevel::Medium < PriorityLevel::High);
    assert!(PriorityLevel::High < PriorityLevel::Critical);
}

#[test]
fn default_metadata_classifies_safety_as_critical() {
    assert_eq!(
        default_metadata("safety/violation").priority,
        Some(PriorityLevel::Critical)
    );
    assert_eq!(
        default_metadata("emergency/shutdown").priority,
        Some(PriorityLevel::Critical)
    );
}

#[test]
fn default_metadata_classifies_approval_as_high() {
    assert_eq!(
        default_metadata("finance/approval_required").priority,
        Some(PriorityLevel::High)
    );
    assert_eq!(
        default_metadata("step/review/approval_required/large").priority,
        Some(PriorityLevel::High)
    );
}

#[test]
fn default_metadata_falls_back_to_medium_never_low() {
    assert_eq!(
        default_metadata("finance/transaction/completed").priority,
        Some(PriorityLevel::Medium)
    );
    assert_eq!(default_metadata("").priority, Some(PriorityLevel::Medium));
}

#[test]
fn score_without_markers_equals_the_level_weight() {
    for level in [
        PriorityLevel::Low,
        PriorityLevel::Medium,
        PriorityLevel::High,
        PriorityLevel::Critical,
    ] {
        assert_eq!(
            priority_score(&event("finance/transaction", Some(level))),
            level.weight()
        );
    }
}

#[test]
fn missing_metadata_scores_as_medium() {
    assert_eq!(
        priority_score(&event("finance/transaction", None)),
        PriorityLevel::Medium.weight()
    );
}

#[test]
fn safety_boost_is_level_independent() {
    for level in [
        PriorityLevel::Low,
        PriorityLevel::Medium,
        PriorityLevel::High,
        PriorityLevel::Critical,
    ] {
        let plain = priority_score(&event("ops/task", Some(level)));
        let boosted = priority_score(&event("safety/violation", Some(level)));
        assert_eq!(boosted, plain + SAFETY_BOOST);
    }
}

#[test]
fn boosts_stack_independently() {
    let score = priority_score(&event(
        "safety/approval_required/override",
        Some(PriorityLevel::High),
    ));
    assert_eq!(
        score,
        PriorityLevel::High.weight() + SAFETY_BOOST + APPROVAL_BOOST
    );
}

#[test]
fn undeclared_safety_event_scores_critical_plus_boost() {
    // An event with no producer metadata takes the default classification
    let mut event = EventEnvelope::new("e1", "safety/violation", json!(null));
    event.metadata = Some(default_metadata(&event.event_type));

    assert_eq!(
        priority_score(&event),
        PriorityLevel::Critical.weight() + SAFETY_BOOST
    );
}
