use crate::config::ReconnectConfig;
use std::time::Duration;

/// Exponential backoff schedule for reconnect attempts.
///
/// Delays are `base * multiplier^n` for `n` in `0..max_attempts`; the policy is exhausted
/// after that and only `reset` makes it usable again.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    base_delay: Duration,
    multiplier: u32,
    max_attempts: u32,
    attempt: u32,
    current_delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, multiplier: u32, max_attempts: u32) -> Self {
        let multiplier = multiplier.max(1);
        Self {
            base_delay,
            multiplier,
            max_attempts,
            attempt: 0,
            current_delay: base_delay,
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(config.base_delay(), config.multiplier, config.max_attempts)
    }

    /// Delay before the next attempt, or `None` once the budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }

        let delay = self.current_delay;
        self.attempt += 1;
        self.current_delay = self.current_delay.saturating_mul(self.multiplier);
        Some(delay)
    }

    /// Restore the initial schedule after a successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current_delay = self.base_delay;
    }

    /// Attempts handed out since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 2, 5)
    }
}
