//! Bounded-concurrency batch executor
//!
//! Records are processed in consecutive chunks of `max_concurrency`. Every
//! record of a chunk runs concurrently and the next chunk starts only once
//! the whole chunk has resolved, so at most `max_concurrency` calls are ever
//! in flight. Outcomes come back in input order whatever order the calls
//! finish in.

use std::future::Future;

use futures::future::join_all;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

use crate::error::{BatchError, ClassifiedError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Records in flight at once; 0 and 1 both mean sequential
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Record failures as outcomes instead of aborting the batch
    #[serde(default)]
    pub continue_on_error: bool,
}

fn default_max_concurrency() -> usize {
    5
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            continue_on_error: false,
        }
    }
}

impl BatchOptions {
    pub fn sequential() -> Self {
        Self {
            max_concurrency: 1,
            ..Default::default()
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }
}

/// Result of one input record
///
/// Holds either a result or an error, never both.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutcome<R, T> {
    pub index: usize,
    pub original_data: R,
    outcome: Result<T, ClassifiedError>,
}

impl<R, T> OperationOutcome<R, T> {
    pub fn succeeded(index: usize, original_data: R, result: T) -> Self {
        Self {
            index,
            original_data,
            outcome: Ok(result),
        }
    }

    pub fn failed(index: usize, original_data: R, error: ClassifiedError) -> Self {
        Self {
            index,
            original_data,
            outcome: Err(error),
        }
    }

    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn result(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ClassifiedError> {
        self.outcome.as_ref().err()
    }

    /// Split into the input record and the call's result
    pub fn into_parts(self) -> (usize, R, Result<T, ClassifiedError>) {
        (self.index, self.original_data, self.outcome)
    }
}

impl<R: Serialize, T: Serialize> Serialize for OperationOutcome<R, T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("OperationOutcome", 4)?;
        state.serialize_field("index", &self.index)?;
        state.serialize_field("success", &self.success())?;
        match &self.outcome {
            Ok(result) => state.serialize_field("result", result)?,
            Err(error) => state.serialize_field("error", error)?,
        }
        state.serialize_field("originalData", &self.original_data)?;
        state.end()
    }
}

/// Run `processor` over every record.
///
/// With `continue_on_error` a failing record becomes a failed outcome.
/// Without it the first failure (in input order within its chunk) aborts the
/// batch: later chunks are never started, while siblings already running in
/// the same chunk are allowed to finish.
pub async fn run_batch<R, T, F, Fut>(
    records: Vec<R>,
    processor: F,
    options: &BatchOptions,
) -> Result<Vec<OperationOutcome<R, T>>, BatchError>
where
    F: Fn(usize, &R) -> Fut,
    Fut: Future<Output = Result<T, ClassifiedError>>,
{
    let chunk_size = options.max_concurrency.max(1);
    let total = records.len();
    let mut outcomes = Vec::with_capacity(total);
    let mut pending = records.into_iter().enumerate();

    loop {
        let chunk: Vec<(usize, R)> = pending.by_ref().take(chunk_size).collect();
        let Some((first, _)) = chunk.first() else {
            break;
        };
        tracing::debug!(
            first = *first,
            size = chunk.len(),
            total,
            "dispatching batch chunk"
        );

        let results = join_all(
            chunk
                .iter()
                .map(|(index, record)| processor(*index, record)),
        )
        .await;

        for ((index, record), result) in chunk.into_iter().zip(results) {
            match result {
                Ok(value) => outcomes.push(OperationOutcome::succeeded(index, record, value)),
                Err(error) if options.continue_on_error => {
                    tracing::debug!(index, code = %error.code(), "record failed, continuing");
                    outcomes.push(OperationOutcome::failed(index, record, error));
                }
                Err(error) => return Err(BatchError::Aborted { index, error }),
            }
        }
    }

    Ok(outcomes)
}
