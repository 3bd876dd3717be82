//! Reconnection backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reconnection settings for stream connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Consecutive failed reconnects before giving up; `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            backoff_base_ms: 1000,
            backoff_max_ms: 30_000,
            max_reconnect_attempts: None,
        }
    }
}

impl StreamSettings {
    /// `base * 2^attempt`, capped at `backoff_max_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor).min(self.backoff_max_ms))
    }
}

/// Delay before reconnect `attempt` with the default settings.
pub fn get_backoff_delay(attempt: u32) -> Duration {
    StreamSettings::default().delay_for(attempt)
}
