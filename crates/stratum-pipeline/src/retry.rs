// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-activity retry policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happens when an activity fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// The run stops as FAILED and waits for an explicit node retry.
    #[default]
    Manual,
    /// The executor re-dispatches the activity with exponential backoff.
    Auto {
        /// Total attempts including the first one.
        max_attempts: u32,
        /// Base delay before the second attempt in milliseconds.
        delay_ms: u64,
    },
}

impl RetryPolicy {
    pub fn auto(max_attempts: u32, delay_ms: u64) -> Self {
        Self::Auto {
            max_attempts: max_attempts.max(1),
            delay_ms,
        }
    }

    /// Whether another attempt is allowed after `attempt` failed (1-indexed).
    pub fn allows_another(&self, attempt: u32) -> bool {
        match self {
            Self::Manual => false,
            Self::Auto { max_attempts, .. } => attempt < *max_attempts,
        }
    }

    /// Delay before the attempt following failed attempt `attempt` (1-indexed).
    ///
    /// Doubles with every failure: `delay_ms * 2^(attempt-1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self {
            Self::Manual => Duration::ZERO,
            Self::Auto { delay_ms, .. } => {
                let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1));
                Duration::from_millis(delay_ms.saturating_mul(multiplier))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy::auto(4, 100);
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy::auto(100, u64::MAX / 2);
        assert_eq!(policy.delay_after(64), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_allows_another() {
        assert!(!RetryPolicy::Manual.allows_another(1));
        let policy = RetryPolicy::auto(3, 10);
        assert!(policy.allows_another(1));
        assert!(policy.allows_another(2));
        assert!(!policy.allows_another(3));
    }

    #[test]
    fn test_auto_requires_one_attempt() {
        assert_eq!(
            RetryPolicy::auto(0, 5),
            RetryPolicy::Auto {
                max_attempts: 1,
                delay_ms: 5
            }
        );
    }
}
