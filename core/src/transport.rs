//! Job-queue transport collaborator seam.
//!
//! An external queue accepts a payload and resolves with success or failure.
//! Its own retry semantics are independent of the bus's retry executor; the
//! two compose but are never conflated.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// Submission options understood by the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Completion report from the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub success: bool,
}

/// Submit a job, await completion or failure.
#[async_trait]
pub trait JobTransport: Send + Sync {
    async fn submit(&self, payload: Value, options: JobOptions) -> Result<JobOutcome>;
}
