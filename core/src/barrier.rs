//! Quorum-based barrier synchronization.
//!
//! A barrier opens with a [`BarrierConfig`], collects acknowledgments from
//! distinct responders, and resolves once its quorum is met. The timeout
//! action decides what an elapsed deadline means: `Block` keeps the barrier
//! pending (timeout is advisory, the caller polls or closes explicitly),
//! `Continue` resolves it as satisfied-by-timeout, and `Defer` parks it for
//! re-evaluation on the next acknowledgment.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::watch;
use tracing::debug;

use crate::{BusError, Result};

/// Default barrier deadline.
pub const DEFAULT_BARRIER_TIMEOUT_MS: u64 = 30_000;

pub type BarrierId = String;

/// Acknowledgment requirement: at least N distinct responders, or every
/// identifier in the barrier's required-responder set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Quorum {
    Count(u32),
    All,
}

impl Serialize for Quorum {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Quorum::Count(n) => serializer.serialize_u32(*n),
            Quorum::All => serializer.serialize_str("all"),
        }
    }
}

impl<'de> Deserialize<'de> for Quorum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Count(u32),
            Tag(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Count(n) => Ok(Quorum::Count(n)),
            Repr::Tag(s) if s == "all" => Ok(Quorum::All),
            Repr::Tag(s) => Err(serde::de::Error::custom(format!(
                "quorum must be a count or \"all\", got \"{s}\""
            ))),
        }
    }
}

/// What an elapsed deadline means for an unresolved barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutAction {
    Block,
    Continue,
    Defer,
}

/// Configuration for one coordination point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarrierConfig {
    pub quorum: Quorum,
    pub timeout_ms: u64,
    pub timeout_action: TimeoutAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_responders: Option<Vec<String>>,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            quorum: Quorum::Count(1),
            timeout_ms: DEFAULT_BARRIER_TIMEOUT_MS,
            timeout_action: TimeoutAction::Block,
            required_responders: None,
        }
    }
}

/// Caller overrides for [`BarrierConfig::with_overrides`]. Every field merges
/// independently; omitted fields fall back to the default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BarrierOverrides {
    pub quorum: Option<Quorum>,
    pub timeout_ms: Option<u64>,
    pub timeout_action: Option<TimeoutAction>,
    pub required_responders: Option<Vec<String>>,
}

impl BarrierConfig {
    /// Merges caller overrides onto the defaults, field by field.
    pub fn with_overrides(overrides: BarrierOverrides) -> Self {
        let defaults = Self::default();
        Self {
            quorum: overrides.quorum.unwrap_or(defaults.quorum),
            timeout_ms: overrides.timeout_ms.unwrap_or(defaults.timeout_ms),
            timeout_action: overrides.timeout_action.unwrap_or(defaults.timeout_action),
            required_responders: overrides
                .required_responders
                .or(defaults.required_responders),
        }
    }
}

/// Observable barrier state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BarrierState {
    Pending { acknowledged: usize, timed_out: bool },
    Resolved { by_timeout: bool },
    Deferred { acknowledged: usize },
}

impl BarrierState {
    pub fn is_resolved(&self) -> bool {
        matches!(self, BarrierState::Resolved { .. })
    }
}

struct BarrierEntry {
    config: BarrierConfig,
    acked: HashSet<String>,
    timed_out: bool,
    deferred: bool,
    resolved: Option<bool>, // Some(by_timeout) once resolved
    tx: watch::Sender<BarrierState>,
}

impl BarrierEntry {
    fn state(&self) -> BarrierState {
        if let Some(by_timeout) = self.resolved {
            BarrierState::Resolved { by_timeout }
        } else if self.deferred {
            BarrierState::Deferred {
                acknowledged: self.acked.len(),
            }
        } else {
            BarrierState::Pending {
                acknowledged: self.acked.len(),
                timed_out: self.timed_out,
            }
        }
    }

    fn quorum_met(&self) -> bool {
        match &self.config.quorum {
            Quorum::Count(n) => self.acked.len() as u32 >= *n,
            // With no fixed responder universe, "all" can only be resolved by
            // explicit closure.
            Quorum::All => match &self.config.required_responders {
                Some(required) => required.iter().all(|r| self.acked.contains(r)),
                None => false,
            },
        }
    }

    fn publish(&self) {
        let _ = self.tx.send(self.state());
    }
}

/// Tracks open barriers and applies quorum and timeout transitions.
pub struct BarrierCoordinator {
    barriers: Arc<DashMap<BarrierId, BarrierEntry>>,
    seq: AtomicU64,
}

impl Default for BarrierCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl BarrierCoordinator {
    pub fn new() -> Self {
        Self {
            barriers: Arc::new(DashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Opens a barrier and schedules its timeout.
    pub fn open(&self, config: BarrierConfig) -> BarrierId {
        let id = format!("barrier-{}", self.seq.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, _) = watch::channel(BarrierState::Pending {
            acknowledged: 0,
            timed_out: false,
        });
        let timeout_ms = config.timeout_ms;
        self.barriers.insert(
            id.clone(),
            BarrierEntry {
                config,
                acked: HashSet::new(),
                timed_out: false,
                deferred: false,
                resolved: None,
                tx,
            },
        );

        let barriers = Arc::clone(&self.barriers);
        let timeout_id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            if let Some(mut entry) = barriers.get_mut(&timeout_id) {
                if entry.resolved.is_some() {
                    return;
                }
                match entry.config.timeout_action {
                    TimeoutAction::Block => entry.timed_out = true,
                    TimeoutAction::Continue => entry.resolved = Some(true),
                    TimeoutAction::Defer => entry.deferred = true,
                }
                debug!(barrier = %timeout_id, action = ?entry.config.timeout_action, "barrier deadline elapsed");
                entry.publish();
            }
        });

        id
    }

    /// Records an acknowledgment from `responder`. Duplicate responders count
    /// once. Resolves the barrier when the quorum is met, including a deferred
    /// barrier being re-evaluated.
    pub fn acknowledge(&self, id: &str, responder: &str) -> Result<BarrierState> {
        let mut entry = self
            .barriers
            .get_mut(id)
            .ok_or_else(|| BusError::BarrierNotFound(id.to_string()))?;

        if entry.resolved.is_some() {
            return Ok(entry.state());
        }

        entry.acked.insert(responder.to_string());
        if entry.quorum_met() {
            entry.resolved = Some(false);
        }
        entry.publish();
        Ok(entry.state())
    }

    /// Resolves a barrier explicitly, regardless of quorum. This is the only
    /// path to resolution for `Quorum::All` without required responders.
    pub fn close(&self, id: &str) -> Result<BarrierState> {
        let mut entry = self
            .barriers
            .get_mut(id)
            .ok_or_else(|| BusError::BarrierNotFound(id.to_string()))?;
        if entry.resolved.is_none() {
            entry.resolved = Some(false);
        }
        entry.publish();
        Ok(entry.state())
    }

    /// Current state, if the barrier exists.
    pub fn status(&self, id: &str) -> Option<BarrierState> {
        self.barriers.get(id).map(|entry| entry.state())
    }

    /// Suspends until the barrier resolves. A `Block` barrier past its
    /// deadline stays pending, so callers pairing `wait` with that action
    /// should apply their own deadline or poll [`Self::status`].
    pub async fn wait(&self, id: &str) -> Result<BarrierState> {
        let mut rx = {
            let entry = self
                .barriers
                .get(id)
                .ok_or_else(|| BusError::BarrierNotFound(id.to_string()))?;
            entry.tx.subscribe()
        };

        loop {
            let state = rx.borrow().clone();
            if state.is_resolved() {
                return Ok(state);
            }
            rx.changed()
                .await
                .map_err(|_| BusError::BarrierNotFound(id.to_string()))?;
        }
    }

    /// Number of barriers currently tracked.
    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.barriers.is_empty()
    }
}
