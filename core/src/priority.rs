//! Priority levels and dispatch-order scoring.
//!
//! Levels carry power-of-ten base weights so that additive class boosts can
//! never promote an event across a level boundary by accident.

use serde::{Deserialize, Serialize};

use crate::envelope::{EventEnvelope, EventMetadata};

/// Score boost for safety/emergency-classed event types.
pub const SAFETY_BOOST: u32 = 500;

/// Score boost for approval-required event types.
pub const APPROVAL_BOOST: u32 = 200;

/// Ordered priority levels: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl PriorityLevel {
    /// Base numeric weight used for dispatch ordering.
    pub fn weight(self) -> u32 {
        match self {
            PriorityLevel::Low => 1,
            PriorityLevel::Medium => 10,
            PriorityLevel::High => 100,
            PriorityLevel::Critical => 1000,
        }
    }
}

/// First path segment of an event type.
fn leading_segment(event_type: &str) -> &str {
    event_type.split('/').next().unwrap_or("")
}

/// Safety-critical event class: types rooted at `safety` or `emergency`.
pub fn is_safety_class(event_type: &str) -> bool {
    matches!(leading_segment(event_type), "safety" | "emergency")
}

/// Approval-required event class: marker may appear anywhere in the type.
pub fn is_approval_class(event_type: &str) -> bool {
    event_type.contains("approval_required")
}

/// Classifies an event type into default metadata when the producer supplied
/// none. Safety-classed types are Critical, approval-required types High,
/// everything else Medium (never Low by default).
pub fn default_metadata(event_type: &str) -> EventMetadata {
    let priority = if is_safety_class(event_type) {
        PriorityLevel::Critical
    } else if is_approval_class(event_type) {
        PriorityLevel::High
    } else {
        PriorityLevel::Medium
    };
    EventMetadata {
        priority: Some(priority),
        ..Default::default()
    }
}

/// Numeric dispatch score: the declared level's weight (Medium when absent)
/// plus independent, stacking class boosts.
pub fn priority_score(event: &EventEnvelope) -> u32 {
    let base = event
        .metadata
        .as_ref()
        .and_then(|m| m.priority)
        .unwrap_or(PriorityLevel::Medium)
        .weight();

    let mut score = base;
    if is_safety_class(&event.event_type) {
        score += SAFETY_BOOST;
    }
    if is_approval_class(&event.event_type) {
        score += APPROVAL_BOOST;
    }
    score
}
