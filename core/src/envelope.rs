//! The event envelope: the unit of dispatch, its structural validator, and
//! the audit-log projection.
//!
//! Canonically an envelope's timestamp is a real date value
//! (`DateTime<Utc>`); the wire form carries it as integer epoch milliseconds
//! and the audit projection renders it as RFC 3339.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::priority::PriorityLevel;
use crate::{BusError, Result};

/// Reserved metadata keys with bus-defined meaning.
///
/// Everything else in `EventMetadata.extra` is a free-form bag the bus
/// carries but does not interpret.
pub mod keys {
    /// Identifier of an open barrier this event acknowledges
    pub const BARRIER_ID: &str = "barrier_id";
    /// Responder identity for a barrier acknowledgment
    pub const RESPONDER: &str = "responder";
}

/// Routing metadata. Only `priority` has bus-defined meaning; the rest rides
/// along untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<PriorityLevel>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Chain-of-custody across handlers. The last handler to process the event
/// appends to `processed_by` before re-publishing a derived envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progression {
    pub state: String,
    pub processed_by: Vec<String>,
}

/// Linkage to the originating unit of work. Read-only once set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLink {
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_swarm_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// The unit of dispatch.
///
/// `id`, `event_type`, `timestamp` and `data` are always present; envelopes
/// are immutable once dispatched. A handler forwarding a derived event must
/// construct a new envelope with a new id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progression: Option<Progression>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionLink>,
}

impl EventEnvelope {
    pub fn new(id: impl Into<String>, event_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            data,
            metadata: None,
            progression: None,
            execution: None,
        }
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Sets the declared priority, creating metadata if absent.
    pub fn with_priority(mut self, priority: PriorityLevel) -> Self {
        self.metadata.get_or_insert_with(Default::default).priority = Some(priority);
        self
    }

    pub fn with_progression(mut self, progression: Progression) -> Self {
        self.progression = Some(progression);
        self
    }

    pub fn with_execution(mut self, execution: ExecutionLink) -> Self {
        self.execution = Some(execution);
        self
    }

    /// Marks this event as an acknowledgment of an open barrier.
    pub fn with_barrier_ack(
        mut self,
        barrier_id: impl Into<String>,
        responder: impl Into<String>,
    ) -> Self {
        let meta = self.metadata.get_or_insert_with(Default::default);
        meta.extra
            .insert(keys::BARRIER_ID.to_string(), Value::String(barrier_id.into()));
        meta.extra
            .insert(keys::RESPONDER.to_string(), Value::String(responder.into()));
        self
    }

    /// Strict conversion from an untrusted wire value. Runs the structural
    /// validator first so rejections name the offending field.
    pub fn from_value(value: Value) -> Result<Self> {
        if let Some(problem) = structure_error(&value) {
            return Err(BusError::Validation(problem));
        }
        serde_json::from_value(value).map_err(|e| BusError::Validation(e.to_string()))
    }

    /// Projection for audit logging; not a full serialization format.
    pub fn audit_record(&self) -> AuditRecord {
        let data_keys = self
            .data
            .as_object()
            .map(|obj| obj.keys().cloned().collect());
        AuditRecord {
            id: self.id.clone(),
            event_type: self.event_type.clone(),
            timestamp: self.timestamp.to_rfc3339(),
            metadata: self.metadata.clone(),
            data_keys,
            progression: self.progression.as_ref().map(|p| p.state.clone()),
            execution: self.execution.clone(),
        }
    }

    /// Reads a reserved metadata key as a string, if present.
    pub(crate) fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.extra.get(key))
            .and_then(Value::as_str)
    }
}

/// Wire/log encoding of an envelope for external consumption.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// ISO-8601 (RFC 3339) rendering of the envelope timestamp
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
    /// Top-level keys of `data` when it is an object, absent otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_keys: Option<Vec<String>>,
    /// The progression state only; the custody list is not logged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionLink>,
}

/// Pure structural check over an untrusted candidate. Never panics, never
/// errors: any input produces `true` or `false`.
pub fn validate_event_structure(candidate: &Value) -> bool {
    structure_error(candidate).is_none()
}

/// Like [`validate_event_structure`], but describes the first problem found.
/// `None` means the candidate is structurally valid.
pub fn structure_error(candidate: &Value) -> Option<String> {
    let obj = match candidate.as_object() {
        Some(obj) => obj,
        None => return Some("event must be an object".to_string()),
    };

    for field in ["id", "type", "timestamp", "data"] {
        if !obj.contains_key(field) {
            return Some(format!("missing required field `{field}`"));
        }
    }
    if !obj["id"].is_string() {
        return Some("field `id` must be a string".to_string());
    }
    if !obj["type"].is_string() {
        return Some("field `type` must be a string".to_string());
    }
    // A date value in the canonical wire form is epoch milliseconds; a string
    // rendering is rejected.
    if !obj["timestamp"].is_i64() && !obj["timestamp"].is_u64() {
        return Some("field `timestamp` must be a date value, not a string".to_string());
    }

    match obj.get("metadata") {
        None | Some(Value::Null) => {}
        Some(Value::Object(_)) => {}
        Some(_) => return Some("field `metadata` must be an object".to_string()),
    }

    match obj.get("progression") {
        None | Some(Value::Null) => {}
        Some(Value::Object(prog)) => {
            if !prog.get("state").map_or(false, Value::is_string) {
                return Some("field `progression.state` must be a string".to_string());
            }
            match prog.get("processedBy") {
                Some(Value::Array(entries)) if entries.iter().all(Value::is_string) => {}
                _ => {
                    return Some(
                        "field `progression.processedBy` must be an array of strings".to_string(),
                    )
                }
            }
        }
        Some(_) => return Some("field `progression` must be an object".to_string()),
    }

    match obj.get("execution") {
        None | Some(Value::Null) => {}
        Some(Value::Object(_)) => {}
        Some(_) => return Some("field `execution` must be an object".to_string()),
    }

    None
}
