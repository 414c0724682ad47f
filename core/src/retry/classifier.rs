//! Retry eligibility and delay computation

use std::time::Duration;

use crate::error::ApiError;

/// Whether a failure with this HTTP status may be retried unchanged.
///
/// No status means the request never got a response; those are retried, as
/// are 5xx. Every 4xx is the caller's problem and retrying cannot fix it.
pub fn is_retryable_status(status: Option<u16>) -> bool {
    match status {
        None => true,
        Some(status) => (500..=599).contains(&status),
    }
}

/// Trait for errors the executor can decide to retry
pub trait RetryClassifiable {
    fn http_status(&self) -> Option<u16>;

    fn is_retryable(&self) -> bool {
        is_retryable_status(self.http_status())
    }
}

impl RetryClassifiable for ApiError {
    fn http_status(&self) -> Option<u16> {
        self.status()
    }

    fn is_retryable(&self) -> bool {
        match self {
            // Built before anything was sent; another attempt builds the same request.
            ApiError::InvalidConfig(_) => false,
            _ => is_retryable_status(self.status()),
        }
    }
}

pub fn should_retry<E: RetryClassifiable + ?Sized>(error: &E) -> bool {
    error.is_retryable()
}

/// `min(base * 2^attempt, max)` for a zero-based attempt
pub fn compute_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}
