//! Structured logging collaborator
//!
//! Request lifecycle events (start, retry, terminal failure) are reported
//! through an injected [`RequestLogger`] instead of a global function, so a
//! host can route them wherever it keeps its own logs.

use serde_json::Value;

/// Severity of a lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Sink for structured lifecycle events.
///
/// `context` is always a JSON object. Implementations must not assume it
/// contains any particular key.
pub trait RequestLogger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, context: &Value);
}

/// Forwards events to `tracing` with the context attached as a field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl RequestLogger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str, context: &Value) {
        match level {
            LogLevel::Debug => tracing::debug!(context = %context, "{message}"),
            LogLevel::Info => tracing::info!(context = %context, "{message}"),
            LogLevel::Warn => tracing::warn!(context = %context, "{message}"),
            LogLevel::Error => tracing::error!(context = %context, "{message}"),
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl RequestLogger for NoopLogger {
    fn log(&self, _level: LogLevel, _message: &str, _context: &Value) {}
}
