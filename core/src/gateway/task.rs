//! Waiting on asynchronous memorize tasks

use std::time::Duration;

use tokio::time::Instant;

use super::OperationGateway;
use crate::error::{ClassifiedError, Result};
use crate::operation::{TaskState, TaskStatus, TaskStatusRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Poll `task_id` until it reaches SUCCESS or FAILED.
///
/// A FAILED task is returned as `Ok`; the caller decides what it means.
/// Fails with `TIMEOUT` when the next poll would start after
/// `options.timeout`.
pub async fn wait_for_task(
    gateway: &dyn OperationGateway,
    task_id: &str,
    options: &WaitOptions,
) -> Result<TaskStatus> {
    let request = TaskStatusRequest::new(task_id);
    let started = Instant::now();
    let mut polls = 0u32;

    loop {
        let status = gateway.poll_task_status(&request).await?;
        polls += 1;
        if status.status.is_terminal() {
            tracing::debug!(task_id, status = status.status.as_str(), polls, "task finished");
            return Ok(status);
        }

        if started.elapsed() + options.interval > options.timeout {
            return Err(timed_out(task_id, status.status, options.timeout));
        }
        tracing::trace!(task_id, status = status.status.as_str(), "task still running");
        tokio::time::sleep(options.interval).await;
    }
}

fn timed_out(task_id: &str, last: TaskState, timeout: Duration) -> ClassifiedError {
    ClassifiedError::timeout(format!(
        "Task {task_id} did not finish within {timeout:?} (last status: {})",
        last.as_str()
    ))
}
