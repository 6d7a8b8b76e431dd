//! Subscription configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::error::SubscriptionError;

/// Rule for when a new fetch may start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Gate {
    /// No fetch in flight, pending length at most `max-pending`, eligible time reached
    #[default]
    Bounded,
    /// No fetch in flight and eligible time reached; pending length is ignored
    EligibleTime,
}

/// Subscription configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Pending length above which no new fetch starts
    #[serde(rename = "max-pending", default = "default_max_pending")]
    pub max_pending: usize,

    /// Delay before retrying after a failed fetch
    #[serde(rename = "retry-backoff-ms", default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Interval of the liveness tick
    #[serde(rename = "idle-timeout-ms", default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Capacity of the control channel
    #[serde(rename = "control-buffer", default = "default_control_buffer")]
    pub control_buffer: usize,

    /// Optional deadline for a single fetch
    #[serde(rename = "fetch-timeout-ms", default)]
    pub fetch_timeout_ms: Option<u64>,

    #[serde(default)]
    pub gate: Gate,
}

fn default_max_pending() -> usize {
    debug!("default_max_pending: called");
    20
}

fn default_retry_backoff_ms() -> u64 {
    debug!("default_retry_backoff_ms: called");
    5000
}

fn default_idle_timeout_ms() -> u64 {
    debug!("default_idle_timeout_ms: called");
    5000
}

fn default_control_buffer() -> usize {
    debug!("default_control_buffer: called");
    16
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        debug!("SubscriptionConfig::default: called");
        Self {
            max_pending: 20,
            retry_backoff_ms: 5000,
            idle_timeout_ms: 5000,
            control_buffer: 16,
            fetch_timeout_ms: None,
            gate: Gate::Bounded,
        }
    }
}

impl SubscriptionConfig {
    /// Check values that would make the loop misbehave
    pub fn validate(&self) -> Result<(), SubscriptionError> {
        if self.control_buffer == 0 {
            return Err(SubscriptionError::InvalidConfig(
                "control-buffer must be at least 1".to_string(),
            ));
        }
        if self.idle_timeout_ms == 0 {
            return Err(SubscriptionError::InvalidConfig(
                "idle-timeout-ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }
}
