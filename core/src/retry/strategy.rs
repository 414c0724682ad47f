//! Backoff schedule and the resilient request executor
//!
//! The schedule plugs into `backon` as a custom [`BackoffBuilder`], so the
//! retry loop itself (attempt, check, sleep, attempt again) is backon's and
//! the delays are exactly [`compute_delay`].

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, Retryable};
use rand::Rng;
use serde_json::json;

use super::RetryConfig;
use super::classifier::{RetryClassifiable, compute_delay, should_retry};
use crate::error::{ApiError, ApiResult, Result};
use crate::logging::{LogLevel, RequestLogger};
use crate::normalize::classify_error;

/// Builds one [`BackoffSchedule`] per executor invocation
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    config: RetryConfig,
}

impl BackoffPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl BackoffBuilder for BackoffPolicy {
    type Backoff = BackoffSchedule;

    fn build(self) -> Self::Backoff {
        BackoffSchedule {
            attempt: 0,
            max_retries: self.config.max_retries,
            base_delay: self.config.base_delay(),
            max_delay: self.config.max_delay(),
            jitter: self.config.jitter,
        }
    }
}

/// Retry state for one invocation: yields one delay per remaining retry.
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    attempt: u32,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl Iterator for BackoffSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_retries {
            return None;
        }
        let delay = compute_delay(self.attempt, self.base_delay, self.max_delay);
        self.attempt += 1;
        Some(if self.jitter {
            apply_jitter(delay)
        } else {
            delay
        })
    }
}

/// Add up to 10% of `delay` on top of it.
fn apply_jitter(delay: Duration) -> Duration {
    let extra = rand::rng().random_range(0.0..=0.1);
    delay + delay.mul_f64(extra)
}

/// Run `operation` until it succeeds, fails permanently, or runs out of retries.
///
/// Only failures without an HTTP status or with a 5xx status are retried.
/// The terminal failure is classified before it is returned.
pub async fn execute_with_backoff<F, Fut, T>(
    operation: F,
    config: &RetryConfig,
    logger: &dyn RequestLogger,
    label: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    logger.log(
        LogLevel::Debug,
        "memU request started",
        &json!({ "operation": label, "max_retries": config.max_retries }),
    );

    let mut retries: u32 = 0;
    let result = operation
        .retry(BackoffPolicy::new(config.clone()))
        .sleep(tokio::time::sleep)
        .when(should_retry::<ApiError>)
        .notify(|err: &ApiError, delay: Duration| {
            retries += 1;
            logger.log(
                LogLevel::Warn,
                "memU request failed, retrying",
                &json!({
                    "operation": label,
                    "attempt": retries,
                    "max_retries": config.max_retries,
                    "delay_ms": delay.as_millis() as u64,
                    "status": err.http_status(),
                }),
            );
        })
        .await;

    result.map_err(|err| {
        let classified = classify_error(&err);
        logger.log(
            LogLevel::Error,
            "memU request failed",
            &json!({
                "operation": label,
                "code": classified.code().as_str(),
                "status": classified.http_status(),
                "retries": retries,
            }),
        );
        classified
    })
}
