//! Retry policy for the accept loop.
//!
//! The fixture historically swallowed every connection error and retried
//! the accept immediately, without limit. That behavior is kept as the
//! default, but made explicit: an optional attempt cap and exponential
//! backoff between attempts, so a persistent failure neither busy-spins
//! nor hides.

use std::time::Duration;

/// Policy governing retries of failed accept/echo attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum consecutive failed attempts before giving up.
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on the backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Start a fresh backoff sequence.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            attempt: 0,
        }
    }
}

/// Backoff state for one run of consecutive failures.
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    attempt: u32,
}

impl Backoff {
    /// Delay to sleep before the next attempt, or `None` once the
    /// policy's attempt cap is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.policy.max_attempts {
            if self.attempt >= max {
                return None;
            }
        }

        // Cap the shift so the multiplier cannot overflow.
        let exponent = self.attempt.min(16);
        let delay = self
            .policy
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.policy.max_delay);

        self.attempt += 1;
        Some(delay)
    }

    /// Consecutive failed attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Reset after a success so later failures start from the base delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_up_to_cap() {
        let policy = RetryPolicy {
            max_attempts: None,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        };
        let mut backoff = policy.backoff();

        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(20)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(40)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(50)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_bounded_policy_exhausts() {
        let policy = RetryPolicy {
            max_attempts: Some(2),
            ..RetryPolicy::default()
        };
        let mut backoff = policy.backoff();

        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.attempts(), 2);
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let policy = RetryPolicy {
            max_attempts: Some(1),
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        };
        let mut backoff = policy.backoff();

        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10)));
        assert_eq!(backoff.next_delay(), None);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_large_attempt_count_does_not_overflow() {
        let policy = RetryPolicy {
            max_attempts: None,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        };
        let mut backoff = policy.backoff();

        for _ in 0..100 {
            let delay = backoff.next_delay().unwrap();
            assert!(delay <= Duration::from_secs(1));
        }
    }
}
