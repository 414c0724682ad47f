//! memU workflow adapter core
//!
//! Talks to the memU memory API (self-hosted or cloud) on behalf of a
//! workflow node: resilient requests with exponential backoff, bounded
//! concurrency over input records, a confirmation gate for deletes and a
//! uniform output shape for every operation.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod batch;
pub mod config;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod logging;
pub mod node;
pub mod normalize;
pub mod operation;
pub mod retry;

pub use batch::{BatchOptions, OperationOutcome, run_batch};
pub use config::{AdapterConfig, ConfigError, ConfigLoader};
pub use credential::{ApiKind, AuthMode, Credential};
pub use error::{ApiError, BatchError, ClassifiedError, ErrorCode, Result};
pub use gateway::{OperationGateway, WaitOptions, connect, wait_for_task};
pub use guard::{ConfirmationConfig, IdSource, is_confirmed};
pub use logging::{LogLevel, NoopLogger, RequestLogger, TracingLogger};
pub use node::{MemoryNode, NodeItem, NodeParameters, ParamValue};
pub use normalize::{NormalizedResponse, classify_error, shape_success};
pub use operation::{OperationKind, OperationRequest, RawResponse, TaskState, TaskStatus};
pub use retry::{RetryConfig, execute_with_backoff};

/// Adapter version, sent in the default `User-Agent`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
