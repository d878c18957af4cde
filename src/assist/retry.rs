//! Bounded exponential backoff for assist requests.
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    /// Delay to wait after `attempt` (1-based) failed, or `None` when that
    /// was the last allowed attempt. Doubles each time: 1s, 2s, 4s, 8s.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let factor = 1u32 << (attempt - 1).min(31);
        Some(self.initial_delay.saturating_mul(factor))
    }

    pub fn start(&self) -> RetryState {
        RetryState {
            policy: *self,
            attempt: 1,
        }
    }
}

/// Position within one retry sequence.
#[derive(Debug, Clone, Copy)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    /// 1-based number of the attempt about to run (or running).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record a failure of the current attempt. Returns the delay before the
    /// next attempt, or `None` once attempts are exhausted.
    pub fn on_failure(&mut self) -> Option<Duration> {
        let delay = self.policy.delay_after(self.attempt)?;
        self.attempt += 1;
        Some(delay)
    }
}
