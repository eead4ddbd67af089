//! Poll loop settings and idle backoff calculation

use crate::config::AggregatorConfig;
use crate::report::MAX_ERROR_BLOCK_LEN;
use std::time::Duration;

/// Initial idle backoff delay in milliseconds.
/// 250 ms keeps an almost-drained queue from being hammered while staying
/// responsive to messages that become visible again.
pub const IDLE_BACKOFF_INITIAL_MS: u64 = 250;

/// Maximum idle backoff delay in milliseconds.
pub const IDLE_BACKOFF_MAX_MS: u64 = 5_000; // 5 seconds

/// Tunables of one poll loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSettings {
    /// Suspend when less than this is left of the time budget
    pub safety_margin: Duration,
    /// First sleep after a tick without progress
    pub idle_backoff_initial: Duration,
    /// Longest sleep between idle ticks
    pub idle_backoff_max: Duration,
    /// Longest error block kept per report section
    pub max_error_block_len: usize,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            safety_margin: Duration::from_millis(crate::config::DEFAULT_TIME_BUDGET_MARGIN_MS),
            idle_backoff_initial: Duration::from_millis(IDLE_BACKOFF_INITIAL_MS),
            idle_backoff_max: Duration::from_millis(IDLE_BACKOFF_MAX_MS),
            max_error_block_len: MAX_ERROR_BLOCK_LEN,
        }
    }
}

impl LoopSettings {
    /// Defaults with the configured safety margin
    pub fn from_config(config: &AggregatorConfig) -> Self {
        Self {
            safety_margin: config.time_budget_margin,
            ..Self::default()
        }
    }

    /// Sleep before the next poll after `idle_ticks` consecutive idle ticks
    ///
    /// Never longer than the time left above the safety margin.
    pub fn idle_backoff(&self, idle_ticks: u32, remaining_millis: u64) -> Duration {
        let delay = calculate_backoff(idle_ticks, self.idle_backoff_initial, self.idle_backoff_max);
        let headroom = Duration::from_millis(remaining_millis).saturating_sub(self.safety_margin);
        delay.min(headroom)
    }
}

/// Calculate exponential backoff delay
pub fn calculate_backoff(retry_count: u32, initial: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(retry_count.min(16));
    initial.saturating_mul(factor).min(max)
}
