//! Pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, PoolResult};

/// Configuration for the change ticket pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Hard bound on open tickets.
    #[serde(default = "default_max_tickets")]
    pub max_tickets: usize,

    /// Age after which an open ticket is stale and blocks new work.
    #[serde(default = "default_stale_threshold_secs")]
    pub stale_threshold_secs: u64,

    /// Let pool remediation expire stale pending or reviewed tickets.
    /// When off, stale tickets are only alerted on and wait for an operator.
    #[serde(default = "default_true")]
    pub evict_stale_on_heal: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_tickets: default_max_tickets(),
            stale_threshold_secs: default_stale_threshold_secs(),
            evict_stale_on_heal: true,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_tickets == 0 {
            return Err(PoolError::InvalidConfig(
                "max_tickets must be at least 1".to_string(),
            ));
        }
        if self.stale_threshold_secs == 0 {
            return Err(PoolError::InvalidConfig(
                "stale_threshold_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn stale_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_threshold_secs.min(i64::MAX as u64) as i64)
    }
}

/// Bounded exponential backoff for background retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1) as i32;
        let raw = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(exp);
        let capped = raw.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_max_tickets() -> usize {
    5
}

fn default_stale_threshold_secs() -> u64 {
    24 * 60 * 60
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let backoff = BackoffConfig {
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            multiplier: 2.0,
            max_attempts: 10,
        };
        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(800));
        assert_eq!(backoff.delay_for(5), Duration::from_millis(1_000));
        assert_eq!(backoff.delay_for(30), Duration::from_millis(1_000));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = PoolConfig {
            max_tickets: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        PoolConfig::default().validate().unwrap();
    }
}
