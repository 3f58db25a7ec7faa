//! Retry scheduling for failed deliveries.
//!
//! Decides whether a notification whose every channel failed gets another
//! attempt, and how long it waits before re-entering the immediate lane.

use std::time::Duration;

use crate::config::{QueueConfig, RetryStrategy};

/// What to do with a notification after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enqueue after the given delay.
    Retry { attempt: u32, delay: Duration },
    /// Retry budget exhausted.
    GiveUp { attempts: u32 },
}

/// Retry policy derived from the queue configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub strategy: RetryStrategy,
}

impl RetryPolicy {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_delay(),
            strategy: config.retry_strategy,
        }
    }

    /// Decide based on the retry count *after* it was incremented for the
    /// attempt that just failed.
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        if retry_count <= self.max_retries {
            RetryDecision::Retry {
                attempt: retry_count,
                delay: self.delay_for(retry_count),
            }
        } else {
            RetryDecision::GiveUp {
                attempts: retry_count,
            }
        }
    }

    /// Delay before the given retry.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        match self.strategy {
            RetryStrategy::Fixed => self.base_delay,
            RetryStrategy::Exponential { max_delay_ms } => {
                let base_ms = self.base_delay.as_millis() as u64;
                let exponent = retry_count.saturating_sub(1).min(32);
                let delay_ms = base_ms
                    .saturating_mul(2u64.saturating_pow(exponent))
                    .min(max_delay_ms);

                // ±25% jitter
                let jitter_range = delay_ms / 4;
                let delay_ms = if jitter_range > 0 {
                    let offset = rand::random::<u64>() % (jitter_range * 2);
                    (delay_ms - jitter_range).saturating_add(offset)
                } else {
                    delay_ms
                };

                Duration::from_millis(delay_ms.min(max_delay_ms))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(strategy: RetryStrategy) -> RetryPolicy {
        RetryPolicy::new(&QueueConfig {
            max_retries: 3,
            retry_delay_ms: 1000,
            retry_strategy: strategy,
            ..Default::default()
        })
    }

    #[test]
    fn test_fixed_delay_until_budget_exhausted() {
        let policy = policy(RetryStrategy::Fixed);

        for count in 1..=3 {
            assert_eq!(
                policy.decide(count),
                RetryDecision::Retry {
                    attempt: count,
                    delay: Duration::from_millis(1000)
                }
            );
        }
        assert_eq!(policy.decide(4), RetryDecision::GiveUp { attempts: 4 });
    }

    #[test]
    fn test_zero_retries_gives_up_immediately() {
        let policy = RetryPolicy::new(&QueueConfig {
            max_retries: 0,
            ..Default::default()
        });
        assert_eq!(policy.decide(1), RetryDecision::GiveUp { attempts: 1 });
    }

    #[test]
    fn test_exponential_delay_grows_and_caps() {
        let policy = policy(RetryStrategy::Exponential {
            max_delay_ms: 3000,
        });

        let first = policy.delay_for(1).as_millis();
        let second = policy.delay_for(2).as_millis();
        let capped = policy.delay_for(10).as_millis();

        assert!((750..=1250).contains(&first));
        assert!((1500..=2500).contains(&second));
        assert!(capped <= 3000);
    }
}
