//! Connection state and reconnect backoff.

use std::time::Duration;

use rand::Rng;

/// Lifecycle state of the realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect, doubled on every further attempt
    pub initial_delay_ms: u64,
    /// Upper bound for the doubled delay, before jitter
    pub max_delay_ms: u64,
    /// Random jitter is drawn from `0..max_jitter_ms`
    pub max_jitter_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            max_jitter_ms: 1000,
        }
    }
}

impl ReconnectConfig {
    /// Delay for `attempt` without jitter: `min(max, initial * 2^attempt)`.
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }

    /// Calculate delay for a given attempt number, jitter included
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter = if self.max_jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.max_jitter_ms)
        };
        Duration::from_millis(self.base_delay_ms(attempt) + jitter)
    }
}
