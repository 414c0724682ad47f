//! Retry logic with exponential backoff
//!
//! This module provides:
//! - Retry eligibility (transport failures and 5xx only)
//! - Exponential backoff capped at a maximum delay, optional jitter
//! - The resilient executor every remote call goes through

pub mod classifier;
pub mod strategy;

pub use classifier::{RetryClassifiable, compute_delay, is_retryable_status, should_retry};
pub use strategy::{BackoffPolicy, BackoffSchedule, execute_with_backoff};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration for remote calls
///
/// `max_retries` counts retries, not attempts: a call is attempted at most
/// `max_retries + 1` times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retry attempts after the first call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for any single delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Add up to 10% random extra delay to each pause
    #[serde(default)]
    pub jitter: bool,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}
