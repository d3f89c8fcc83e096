//! Bounded retry with pluggable backoff for async operations.
//!
//! A [`RetryPolicy`] pairs a maximum attempt count with a backoff function and
//! an optional early-abort predicate. [`with_retry`] wraps an async operation
//! and re-invokes it per the policy, suspending (never blocking) between
//! attempts and emitting a structured warning for every retry.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::warn;

use crate::{BusError, Result};

/// Default base delay for the exponential preset.
pub const DEFAULT_BASE_DELAY_MS: u64 = 100;

/// Default attempt budget for the linear and exponential presets.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

type BackoffFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;
type RetryPredicate = Arc<dyn Fn(&BusError) -> bool + Send + Sync>;

/// External abort signal: flip the watch value to `true` to stop scheduling
/// further attempts. The in-flight attempt is not force-cancelled.
pub type AbortSignal = watch::Receiver<bool>;

/// Retry configuration: attempt budget, backoff curve, optional abort predicate.
///
/// Stateless between invocations; a single policy can be shared across many
/// operations.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffFn,
    should_retry: Option<RetryPredicate>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("has_should_retry", &self.should_retry.is_some())
            .finish()
    }
}

impl RetryPolicy {
    pub fn new<B>(max_attempts: u32, backoff: B) -> Self
    where
        B: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self {
            max_attempts,
            backoff: Arc::new(backoff),
            should_retry: None,
        }
    }

    /// Adds a predicate consulted after each failure; returning `false` stops
    /// retrying immediately and propagates the original error.
    pub fn with_should_retry<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&BusError) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Three attempts, constant delay between each.
    pub fn linear(delay: Duration) -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, move |_| delay)
    }

    /// Three attempts, delay for attempt N (1-indexed) = `base * 2^(N-1)`.
    pub fn exponential(base: Duration) -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, move |attempt| {
            let exp = attempt.saturating_sub(1).min(31);
            base * (1u32 << exp)
        })
    }

    /// Single attempt, no delay: failures propagate immediately.
    pub fn none() -> Self {
        Self::new(1, |_| Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the attempt following `attempt` (1-indexed).
    pub fn backoff(&self, attempt: u32) -> Duration {
        (self.backoff)(attempt)
    }

    /// Whether the policy permits another attempt after `error`. Policies
    /// without a predicate always retry within the attempt budget.
    pub fn should_retry(&self, error: &BusError) -> bool {
        self.should_retry.as_ref().map_or(true, |p| p(error))
    }
}

impl Default for RetryPolicy {
    /// The bus default: exponential backoff from [`DEFAULT_BASE_DELAY_MS`].
    fn default() -> Self {
        Self::exponential(Duration::from_millis(DEFAULT_BASE_DELAY_MS))
    }
}

/// Structured fields attached to every retry warning.
#[derive(Debug, Clone, Serialize)]
pub struct RetryAttempt {
    pub error: String,
    pub attempt: u32,
    pub delay_ms: u64,
}

/// Sink for retry warnings. The bus installs a stats-counting logger; the
/// default implementation forwards to `tracing`.
pub trait RetryLogger: Send + Sync {
    fn warn(&self, message: &str, attempt: &RetryAttempt);
}

/// Logs retry warnings through `tracing::warn!` with structured fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRetryLogger;

impl RetryLogger for TracingRetryLogger {
    fn warn(&self, message: &str, attempt: &RetryAttempt) {
        warn!(
            error = %attempt.error,
            attempt = attempt.attempt,
            delay_ms = attempt.delay_ms,
            "{message}"
        );
    }
}

/// Runs `operation`, retrying failures according to `policy`.
///
/// Success returns immediately. After a failure the policy's predicate is
/// consulted; a veto propagates the original error with no delay and no
/// further invocation. Otherwise the executor sleeps for the backoff delay,
/// emits a retry warning, and re-invokes. Once the attempt budget is spent the
/// last error is wrapped in [`BusError::RetryExhausted`] with its message
/// preserved.
///
/// A policy with `max_attempts == 0` never invokes the operation and resolves
/// to [`BusError::NoAttempts`].
pub async fn with_retry<T, F, Fut>(
    operation: F,
    policy: &RetryPolicy,
    logger: &dyn RetryLogger,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    with_retry_abortable(operation, policy, logger, None).await
}

/// [`with_retry`] with an optional external abort signal. Once the signal
/// flips to `true`, no further attempts are scheduled and the last error is
/// propagated as-is.
pub async fn with_retry_abortable<T, F, Fut>(
    mut operation: F,
    policy: &RetryPolicy,
    logger: &dyn RetryLogger,
    abort: Option<AbortSignal>,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    if policy.max_attempts() == 0 {
        return Err(BusError::NoAttempts);
    }

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !policy.should_retry(&error) {
            return Err(error);
        }
        if attempt >= policy.max_attempts() {
            return Err(BusError::RetryExhausted {
                attempts: attempt,
                message: error.to_string(),
            });
        }
        if aborted(&abort) {
            return Err(error);
        }

        let delay = policy.backoff(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
            if aborted(&abort) {
                return Err(error);
            }
        }

        logger.warn(
            "operation failed, retrying",
            &RetryAttempt {
                error: error.to_string(),
                attempt,
                delay_ms: delay.as_millis() as u64,
            },
        );
    }
}

fn aborted(signal: &Option<AbortSignal>) -> bool {
    signal.as_ref().map_or(false, |rx| *rx.borrow())
}
