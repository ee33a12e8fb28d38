//! Retry budget and per-attempt outcome types.

use std::time::Duration;

use crate::models::catalog::RecordKind;
use crate::AppError;

/// Attempt budget carried by every unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// Build a policy; `max_attempts` is clamped to at least one.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Attempts allowed, including the first.
    #[must_use]
    pub fn attempts_allowed(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before a retry is re-enqueued.
    #[must_use]
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Whether `attempt` (1-based) is the last one the budget permits.
    ///
    /// Both the simulated-failure path and the store-failure path gate
    /// their counter update on this single predicate.
    #[must_use]
    pub fn is_final_attempt(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(250))
    }
}

/// Result of running one attempt of a unit.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// The item was upserted and counted as processed.
    Success {
        /// Whether the upsert created or replaced the record.
        kind: RecordKind,
    },
    /// The attempt failed and the budget allows another; counters untouched.
    RetryableFailure(AppError),
    /// The budget is exhausted; the item was counted as failed.
    PermanentFailure(AppError),
    /// The owning inquiry no longer exists; nothing was done.
    Discarded,
    /// An earlier attempt already counted this unit as processed.
    AlreadyCounted,
}

impl AttemptOutcome {
    /// Whether the transport should schedule another attempt.
    #[must_use]
    pub fn should_retry(&self) -> bool {
        matches!(self, Self::RetryableFailure(_))
    }
}
