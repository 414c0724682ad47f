//! Adapter configuration
//!
//! Layered loading, lowest priority first:
//! 1. Built-in defaults
//! 2. Optional TOML/JSON file
//! 3. Environment variables, `MEMU_` prefix with `__` for nesting
//!    (e.g. `MEMU_RETRY__MAX_RETRIES=5`, `MEMU_CREDENTIAL__KIND=self_hosted`)
//!
//! `MEMU_API_KEY` is honored as a shorthand for `MEMU_CREDENTIAL__API_KEY`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::batch::BatchOptions;
use crate::credential::{AuthMode, Credential};
use crate::gateway::WaitOptions;
use crate::retry::RetryConfig;

/// Environment variable holding the API key
pub const API_KEY_ENV_VAR: &str = "MEMU_API_KEY";

const ENV_PREFIX: &str = "MEMU";

/// Errors that can occur during configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Configuration file not found at path: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_ms() -> u64 {
    30_000
}
fn default_user_agent() -> String {
    format!("memu-workflow-adapter/{}", crate::VERSION)
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Task-status polling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Give up waiting for a terminal status after this long
    #[serde(default = "default_poll_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_interval_ms() -> u64 {
    5_000
}
fn default_poll_timeout_ms() -> u64 {
    300_000
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            timeout_ms: default_poll_timeout_ms(),
        }
    }
}

impl PollingConfig {
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            interval: Duration::from_millis(self.interval_ms),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(default)]
    pub credential: Credential,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub batch: BatchOptions,

    #[serde(default)]
    pub polling: PollingConfig,
}

impl AdapterConfig {
    pub fn validate(&self) -> Result<()> {
        let base_url = self.credential.base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "credential.base_url must not be empty".to_string(),
            ));
        }
        url::Url::parse(base_url).map_err(|e| {
            ConfigError::ValidationError(format!("credential.base_url is not a URL: {e}"))
        })?;
        if self.credential.auth_mode == AuthMode::Keyed && self.credential.bearer_key().is_none() {
            return Err(ConfigError::ValidationError(format!(
                "an API key is required when auth_mode is keyed (set {API_KEY_ENV_VAR})"
            )));
        }
        if self.batch.max_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "batch.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::ValidationError(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        if self.polling.interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "polling.interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration loader with layered merging support
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load, merge and validate the configuration.
    pub fn load(&self) -> Result<AdapterConfig> {
        let mut config = self.load_unvalidated()?;
        if config.credential.api_key.is_none()
            && let Ok(key) = std::env::var(API_KEY_ENV_VAR)
        {
            config.credential.api_key = Some(key);
        }
        config.validate()?;
        Ok(config)
    }

    fn load_unvalidated(&self) -> Result<AdapterConfig> {
        let mut builder = Config::builder();

        // Layer 1: defaults serialized to JSON
        let defaults_json = serde_json::to_string(&AdapterConfig::default())?;
        builder = builder.add_source(File::from_str(&defaults_json, config::FileFormat::Json));

        // Layer 2: config file
        if let Some(ref path) = self.config_path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            builder = builder.add_source(File::from(path.as_path()));
        }

        // Layer 3: environment
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}
