use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use memu_core::config::HttpConfig;
use memu_core::{
    Credential, LogLevel, NoopLogger, OperationGateway, RequestLogger, RetryConfig, connect,
};
use serde_json::Value;
use wiremock::MockServer;

/// Millisecond backoff so retry tests stay fast on a real clock.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        base_delay_ms: 1,
        max_delay_ms: 5,
        jitter: false,
    }
}

pub fn gateway_for(credential: Credential) -> Arc<dyn OperationGateway> {
    connect(
        &credential,
        &HttpConfig::default(),
        &fast_retry(),
        Arc::new(NoopLogger),
    )
    .expect("gateway")
}

pub fn self_hosted(server: &MockServer) -> Arc<dyn OperationGateway> {
    gateway_for(Credential::self_hosted(server.uri()))
}

pub fn cloud(server: &MockServer) -> Arc<dyn OperationGateway> {
    gateway_for(Credential::cloud("test-key").with_base_url(server.uri()))
}

/// Counts retry notices, one per attempt after the first.
#[derive(Debug, Default)]
pub struct RetryCounter {
    retries: AtomicUsize,
}

impl RetryCounter {
    pub fn retries(&self) -> usize {
        self.retries.load(Ordering::SeqCst)
    }
}

impl RequestLogger for RetryCounter {
    fn log(&self, level: LogLevel, _message: &str, _context: &Value) {
        if level == LogLevel::Warn {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }
    }
}
