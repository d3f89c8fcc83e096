//! Logical processing tiers for routing and metrics grouping.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Processing tier an event type belongs to. Unknown types classify to
/// `None` ("unclassified"), never to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "safety")]
    Safety,
    #[serde(rename = "cross-cutting")]
    CrossCutting,
}

impl Tier {
    pub fn label(self) -> &'static str {
        match self {
            Tier::One => "1",
            Tier::Two => "2",
            Tier::Three => "3",
            Tier::Safety => "safety",
            Tier::CrossCutting => "cross-cutting",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Markers that classify as safety regardless of where they appear.
const SAFETY_MARKERS: [&str; 3] = ["safety", "emergency", "threat"];

/// Classifies an event type by its leading path segment. Safety markers win
/// over any tier rule, wherever they sit in the path. Total over arbitrary
/// strings.
pub fn tier_for_event_type(event_type: &str) -> Option<Tier> {
    if event_type
        .split('/')
        .any(|segment| SAFETY_MARKERS.contains(&segment))
    {
        return Some(Tier::Safety);
    }

    match event_type.split('/').next().unwrap_or("") {
        // High-level coordination concepts
        "swarm" | "goal" | "team" | "resource" => Some(Tier::One),
        // Mid-level process and state concepts
        "routine" | "state" | "context" => Some(Tier::Two),
        // Low-level execution concepts
        "step" | "tool" | "strategy" => Some(Tier::Three),
        // Infrastructure concerns spanning tiers
        "execution" | "recovery" | "fallback" | "circuit_breaker" => Some(Tier::CrossCutting),
        _ => None,
    }
}

/// Stats key for an event type: the tier label, or `"unclassified"`.
pub fn tier_label(event_type: &str) -> &'static str {
    tier_for_event_type(event_type).map_or("unclassified", Tier::label)
}
