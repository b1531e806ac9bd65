//! Retry policy and backoff timing.
//!
//! After a retryable failure on attempt `n` the forwarder waits
//! `backoff_base^n * base_delay` plus a uniformly drawn jitter, capped at
//! `max_delay`. A `Retry-After` from a 429 replaces the computed backoff.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;

/// Retry policy for forwarding one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Multiplier for the delay.
    pub base_delay: Duration,

    /// Exponent base applied per completed attempt.
    pub backoff_base: u32,

    /// Upper bound of the uniformly drawn jitter.
    pub max_jitter: Duration,

    /// Ceiling for any single wait.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_base: 2,
            max_jitter: Duration::from_millis(250),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately; used where timing is irrelevant.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            backoff_base: 1,
            max_jitter: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Deterministic part of the wait after `attempt` failed.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(20);
        let multiplier = self.backoff_base.max(1).saturating_pow(exponent);
        std::cmp::min(self.base_delay.saturating_mul(multiplier), self.max_delay)
    }
}

/// Retry decision after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then try again.
    Retry {
        /// Time to wait before the next attempt
        delay: Duration,
    },
    /// Stop; the failure is terminal.
    Terminal,
    /// Stop; the attempt budget is spent.
    Exhausted,
}

/// Context for deciding what follows a failed attempt.
#[derive(Debug, Clone)]
pub struct RetryContext<'a> {
    /// Attempt that just failed (1-based).
    pub attempt_number: u32,
    /// Failure observed on that attempt.
    pub error: &'a DeliveryError,
    /// Policy in force.
    pub policy: &'a RetryPolicy,
}

impl<'a> RetryContext<'a> {
    /// Creates a new retry context.
    pub fn new(attempt_number: u32, error: &'a DeliveryError, policy: &'a RetryPolicy) -> Self {
        Self { attempt_number, error, policy }
    }

    /// Decides whether and when to try again.
    pub fn decide(&self) -> RetryDecision {
        if !self.error.is_retryable() {
            return RetryDecision::Terminal;
        }

        if self.attempt_number >= self.policy.max_attempts {
            return RetryDecision::Exhausted;
        }

        RetryDecision::Retry { delay: self.calculate_delay() }
    }

    fn calculate_delay(&self) -> Duration {
        if let Some(retry_after) = self.error.retry_after_seconds() {
            return std::cmp::min(Duration::from_secs(retry_after), self.policy.max_delay);
        }

        let backoff = self.policy.backoff_delay(self.attempt_number);
        std::cmp::min(backoff + draw_jitter(self.policy.max_jitter), self.policy.max_delay)
    }
}

/// Draws a jitter uniformly from `[0, max_jitter]`.
fn draw_jitter(max_jitter: Duration) -> Duration {
    if max_jitter.is_zero() {
        return Duration::ZERO;
    }

    let max_ms = u64::try_from(max_jitter.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy { max_jitter: Duration::ZERO, ..Default::default() }
    }

    #[test]
    fn exponential_backoff_increases_correctly() {
        let policy = no_jitter();

        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn max_delay_enforced() {
        let policy = RetryPolicy { max_delay: Duration::from_secs(5), ..no_jitter() };
        assert_eq!(policy.backoff_delay(10), Duration::from_secs(5));
    }

    #[test]
    fn retryable_failure_below_budget_retries() {
        let policy = no_jitter();
        let error = DeliveryError::from_status(500, "", None).unwrap();

        let decision = RetryContext::new(1, &error, &policy).decide();
        assert_eq!(decision, RetryDecision::Retry { delay: Duration::from_secs(2) });
    }

    #[test]
    fn retry_respects_maximum_attempts() {
        let policy = no_jitter();
        let error = DeliveryError::timeout(30);

        assert_eq!(RetryContext::new(3, &error, &policy).decide(), RetryDecision::Exhausted);
    }

    #[test]
    fn client_errors_are_terminal() {
        let policy = no_jitter();
        let error = DeliveryError::from_status(404, "not found", None).unwrap();

        assert_eq!(RetryContext::new(1, &error, &policy).decide(), RetryDecision::Terminal);
    }

    #[test]
    fn retry_after_header_respected() {
        let policy = no_jitter();
        let error = DeliveryError::from_status(429, "", Some(7)).unwrap();

        assert_eq!(RetryContext::new(1, &error, &policy).decide(), RetryDecision::Retry {
            delay: Duration::from_secs(7)
        });
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy::default();
        let error = DeliveryError::network("reset");
        let floor = policy.backoff_delay(1);
        let ceiling = floor + policy.max_jitter;

        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            let RetryDecision::Retry { delay } = RetryContext::new(1, &error, &policy).decide()
            else {
                unreachable!("network errors below the budget retry");
            };
            assert!(delay >= floor && delay <= ceiling, "delay {delay:?} out of range");
            seen.insert(delay);
        }

        assert!(seen.len() > 1, "jitter should create variation");
    }

    #[test]
    fn immediate_policy_never_waits() {
        let policy = RetryPolicy::immediate(5);
        let error = DeliveryError::network("reset");

        assert_eq!(RetryContext::new(4, &error, &policy).decide(), RetryDecision::Retry {
            delay: Duration::ZERO
        });
    }
}
