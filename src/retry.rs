//! Exponential backoff for transport retries.
//!
//! A [`RetryBudget`] lives for one transport call. After every failed attempt
//! the transport asks it for a [`RetryDecision`]; the decision depends only on
//! the error, the attempt count and the policy, so it can be tested without a
//! network.

use crate::error::Error;
use rand::Rng;
use std::time::Duration;

/// Retry policy for idempotent transport calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the initial attempt (so `max_retries + 1` attempts in total).
    pub max_retries: u32,
    /// Delay before the first retry; doubles for every retry after that.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Upper bound of the random delay added on top of the backoff.
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the given delay.
    Retry {
        /// How long to wait before the next attempt.
        delay: Duration,
    },
    /// Stop and surface the error.
    GiveUp {
        /// Why no further attempt is made.
        reason: String,
    },
}

/// Attempt bookkeeping for a single transport call.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    policy: RetryConfig,
    failures: u32,
}

impl RetryBudget {
    /// Creates a fresh budget.
    #[must_use]
    pub fn new(policy: RetryConfig) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Number of failed attempts recorded so far.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Records a failed attempt and decides whether to try again.
    pub fn record_failure(&mut self, error: &Error) -> RetryDecision {
        let jitter = random_jitter(self.policy.jitter);
        self.record_failure_with_jitter(error, jitter)
    }

    /// Same as [`record_failure`](Self::record_failure) with a caller-chosen jitter.
    pub fn record_failure_with_jitter(&mut self, error: &Error, jitter: Duration) -> RetryDecision {
        self.failures += 1;

        if !error.is_retryable() {
            return RetryDecision::GiveUp {
                reason: format!("non-retryable error: {error}"),
            };
        }

        if self.failures > self.policy.max_retries {
            return RetryDecision::GiveUp {
                reason: format!("retry budget of {} exhausted", self.policy.max_retries),
            };
        }

        let mut delay = self.backoff(self.failures - 1, jitter);
        if let Error::HttpStatus {
            retry_after: Some(retry_after),
            ..
        } = error
        {
            delay = delay.max(*retry_after).min(self.policy.max_delay);
        }

        RetryDecision::Retry { delay }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry + jitter`,
    /// capped at the policy's maximum.
    #[must_use]
    pub fn backoff(&self, retry: u32, jitter: Duration) -> Duration {
        let multiplier = 2_u32.saturating_pow(retry.min(20));
        let exponential = self.policy.base_delay.saturating_mul(multiplier);
        exponential
            .saturating_add(jitter)
            .min(self.policy.max_delay)
    }
}

fn random_jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}
