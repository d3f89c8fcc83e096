// Crossbar Core Library
// In-process event coordination runtime

pub mod barrier;
pub mod bus;
pub mod envelope;
pub mod pattern;
pub mod priority;
pub mod retry;
pub mod store;
pub mod telemetry;
pub mod tier;
pub mod transport;

// Export core types
pub use barrier::{
    BarrierConfig, BarrierCoordinator, BarrierId, BarrierOverrides, BarrierState, Quorum,
    TimeoutAction,
};
pub use bus::{
    BusStats, EventBus, EventHandler, FnHandler, PublishReceipt, SubscribeOptions,
    SubscriptionState,
};
pub use envelope::{
    validate_event_structure, AuditRecord, EventEnvelope, EventMetadata, ExecutionLink, Progression,
};
pub use pattern::{BatchEventPatternMatcher, EventPatternMatcher};
pub use priority::PriorityLevel;
pub use retry::{with_retry, RetryAttempt, RetryLogger, RetryPolicy, TracingRetryLogger};
pub use store::EntityStore;
pub use tier::Tier;
pub use transport::{JobOptions, JobOutcome, JobTransport};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("handler error: {0}")]
    Handler(String),

    #[error("retry exhausted after {attempts} attempts: {message}")]
    RetryExhausted { attempts: u32, message: String },

    #[error("retry policy permits no attempts")]
    NoAttempts,

    #[error("unknown failure: {0}")]
    UnknownFailure(String),

    #[error("barrier timed out: {0}")]
    BarrierTimeout(String),

    #[error("barrier not found: {0}")]
    BarrierNotFound(String),

    #[error("subscription error: {0}")]
    Subscription(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BusError>;
