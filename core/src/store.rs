//! Persistence collaborator seam.
//!
//! The bus does not persist anything itself. Handlers that read or write
//! entities do so through this trait, surfacing failures as errors so the
//! retry executor can observe them. Implementations live outside this crate.

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// Opaque entity store contract for event handlers.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get(&self, entity: &str, id: &str) -> Result<Option<Value>>;

    async fn create(&self, entity: &str, record: Value) -> Result<Value>;

    async fn update(&self, entity: &str, id: &str, record: Value) -> Result<Value>;

    async fn delete(&self, entity: &str, id: &str) -> Result<()>;
}
