//! Topic pattern matching for hierarchical event types.
//!
//! Event types are `/`-separated paths (e.g. `finance/transaction/completed`).
//! A pattern is the same shape with two wildcards: `*` matches exactly one
//! segment, and a trailing `#` matches the remainder of the path (including
//! nothing). Patterns are compiled by segment tokenization rather than by
//! building a regex from untrusted input, so construction never fails and
//! matching is total over arbitrary strings.

/// One compiled pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Matches this exact segment text (case-sensitive, no folding).
    Literal(String),
    /// Matches any single segment, including an empty one.
    Any,
}

/// Matches concrete event-type strings against a single topic pattern.
///
/// Construction cannot fail: unusual input (unbalanced brackets, repeated
/// wildcards, non-ASCII segments) compiles to literal segments and matches
/// deterministically.
#[derive(Debug, Clone)]
pub struct EventPatternMatcher {
    pattern: String,
    segments: Vec<Segment>,
    trailing_hash: bool,
}

impl EventPatternMatcher {
    pub fn new(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let mut segments: Vec<Segment> = pattern
            .split('/')
            .map(|seg| match seg {
                "*" => Segment::Any,
                other => Segment::Literal(other.to_string()),
            })
            .collect();

        // `#` is only a wildcard in the final position; anywhere else it is a
        // literal segment.
        let trailing_hash = matches!(segments.last(), Some(Segment::Literal(s)) if s == "#");
        if trailing_hash {
            segments.pop();
        }

        Self {
            pattern,
            segments,
            trailing_hash,
        }
    }

    /// Returns the original pattern string unchanged.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Tests whether `event_type` matches this pattern.
    pub fn matches(&self, event_type: &str) -> bool {
        let parts: Vec<&str> = event_type.split('/').collect();

        if self.trailing_hash {
            // The hash explains any number of trailing segments, including zero.
            if parts.len() < self.segments.len() {
                return false;
            }
        } else if parts.len() != self.segments.len() {
            return false;
        }

        self.segments
            .iter()
            .zip(parts.iter())
            .all(|(seg, part)| match seg {
                Segment::Any => true,
                Segment::Literal(lit) => lit == part,
            })
    }
}

/// Aggregates multiple patterns; matches when any one of them matches.
#[derive(Debug, Clone, Default)]
pub struct BatchEventPatternMatcher {
    patterns: Vec<String>,
    matchers: Vec<EventPatternMatcher>,
}

impl BatchEventPatternMatcher {
    pub fn new(patterns: Vec<String>) -> Self {
        let matchers = patterns
            .iter()
            .map(|p| EventPatternMatcher::new(p.as_str()))
            .collect();
        Self { patterns, matchers }
    }

    /// Returns the original pattern list unchanged.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// True if any contained pattern matches. An empty batch never matches.
    pub fn matches(&self, event_type: &str) -> bool {
        self.matchers.iter().any(|m| m.matches(event_type))
    }
}
