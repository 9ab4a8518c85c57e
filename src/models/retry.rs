// Retry policy for connector calls

//! # Retry Configuration
//!
//! Connector gateways may retry failed calls. The delay before attempt `n`
//! grows according to the configured [`BackoffStrategy`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration for failed connector calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub retry_delay_ms: u64,
    /// Backoff strategy for subsequent retries
    pub backoff_strategy: BackoffStrategy,
}

/// Backoff strategy for retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential backoff with multiplier
    Exponential { multiplier: f64 },
    /// Linear increase in delay
    Linear { increment_ms: u64 },
}

impl RetryConfig {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            retry_delay_ms: 0,
            backoff_strategy: BackoffStrategy::Fixed,
        }
    }

    /// Delay before retry number `retry` (0 = first retry)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.retry_delay_ms;
        let millis = match &self.backoff_strategy {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Exponential { multiplier } => {
                (base as f64 * multiplier.powi(retry as i32)).round() as u64
            }
            BackoffStrategy::Linear { increment_ms } => {
                base.saturating_add(increment_ms.saturating_mul(retry as u64))
            }
        };
        Duration::from_millis(millis)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 200,
            backoff_strategy: BackoffStrategy::Exponential { multiplier: 2.0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let retry = RetryConfig::default();

        assert_eq!(retry.delay_for(0), Duration::from_millis(200));
        assert_eq!(retry.delay_for(1), Duration::from_millis(400));
        assert_eq!(retry.delay_for(2), Duration::from_millis(800));
    }

    #[test]
    fn test_linear_and_fixed_backoff() {
        let linear = RetryConfig {
            max_attempts: 4,
            retry_delay_ms: 100,
            backoff_strategy: BackoffStrategy::Linear { increment_ms: 50 },
        };
        assert_eq!(linear.delay_for(2), Duration::from_millis(200));

        let fixed = RetryConfig {
            backoff_strategy: BackoffStrategy::Fixed,
            ..linear
        };
        assert_eq!(fixed.delay_for(5), Duration::from_millis(100));
    }

    #[test]
    fn test_deserializes_tagged_strategy() {
        let retry: RetryConfig = serde_json::from_value(serde_json::json!({
            "max_attempts": 2,
            "backoff_strategy": {"type": "linear", "increment_ms": 10}
        }))
        .unwrap();

        assert_eq!(retry.max_attempts, 2);
        assert_eq!(retry.retry_delay_ms, 200);
        assert_eq!(retry.backoff_strategy, BackoffStrategy::Linear { increment_ms: 10 });
    }
}
