//! Retry policy for transient transport failures and `NotPrimary` signals.
//!
//! A small enum of strategies, each producing a sequence of delays
//! rather than looping itself, so the caller retains control of
//! cancellation and logging around each attempt.

use std::time::Duration;

use rand::Rng;

/// Backoff strategy plus a bounded attempt count.
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    /// Same delay between every attempt.
    Fixed { delay: Duration, max_attempts: u32 },
    /// Delay doubles each attempt, capped at `max_delay`.
    Exponential {
        base_delay: Duration,
        max_delay: Duration,
        max_attempts: u32,
    },
}

impl RetryPolicy {
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::Fixed { max_attempts, .. } | Self::Exponential { max_attempts, .. } => *max_attempts,
        }
    }

    /// Delay before the attempt numbered `attempt` (0-indexed: `attempt ==
    /// 0` is the first retry, after the initial try already failed).
    /// Jitter is a uniform +/-20% wobble so a client fleet retrying the
    /// same partition doesn't retry in lockstep.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = match self {
            Self::Fixed { delay, .. } => *delay,
            Self::Exponential { base_delay, max_delay, .. } => {
                let scale = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                base_delay.saturating_mul(scale).min(*max_delay)
            }
        };
        jitter(base)
    }
}

fn jitter(base: Duration) -> Duration {
    let factor = rand::rng().random_range(0.8..1.2);
    Duration::from_secs_f64(base.as_secs_f64() * factor)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Exponential {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            max_attempts: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy_reports_max_attempts() {
        let policy = RetryPolicy::Fixed { delay: Duration::from_millis(50), max_attempts: 3 };
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn exponential_delay_grows_but_is_capped() {
        let policy = RetryPolicy::Exponential {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            max_attempts: 10,
        };
        let first = policy.delay_for(0);
        let later = policy.delay_for(8);
        assert!(first <= Duration::from_millis(120));
        assert!(later <= Duration::from_millis(600));
    }

    #[test]
    fn default_policy_is_exponential_with_four_attempts() {
        assert_eq!(RetryPolicy::default().max_attempts(), 4);
    }
}
