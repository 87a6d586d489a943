//! Linear reconnect backoff.

use std::time::Duration;

use crate::config::TelemetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self::new(config.base_delay(), config.max_attempts)
    }

    /// Delay before reconnecting after `failures` consecutive failed
    /// attempts (counting from 1), or `None` when the budget is spent.
    pub fn delay_for(&self, failures: u32) -> Option<Duration> {
        if failures == 0 {
            return Some(Duration::ZERO);
        }
        if failures >= self.max_attempts {
            return None;
        }
        Some(self.base_delay.saturating_mul(failures))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), 5)
    }
}
