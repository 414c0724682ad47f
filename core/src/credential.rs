//! Connection credential supplied by the host platform

use serde::{Deserialize, Serialize};

/// Public memU cloud endpoint
pub const DEFAULT_CLOUD_BASE_URL: &str = "https://api.memu.so";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Send `Authorization: Bearer <key>`
    #[default]
    Keyed,
    /// No authorization header (local self-hosted servers)
    None,
}

/// Which wire dialect the credential speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKind {
    /// memU cloud, `/api/v3/memory/*`
    #[default]
    Cloud,
    /// Self-hosted memU server with REST-style item endpoints
    SelfHosted,
}

/// Immutable for the lifetime of one node invocation.
///
/// `Debug` never prints the key and serialization skips it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub auth_mode: AuthMode,

    #[serde(default)]
    pub kind: ApiKind,
}

fn default_base_url() -> String {
    DEFAULT_CLOUD_BASE_URL.to_string()
}

impl Default for Credential {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            auth_mode: AuthMode::default(),
            kind: ApiKind::default(),
        }
    }
}

impl Credential {
    pub fn cloud(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    /// Self-hosted server without authentication
    pub fn self_hosted(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            auth_mode: AuthMode::None,
            kind: ApiKind::SelfHosted,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self.auth_mode = AuthMode::Keyed;
        self
    }

    /// Base URL without a trailing slash
    pub fn endpoint(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Key to send, if the auth mode calls for one
    pub fn bearer_key(&self) -> Option<&str> {
        match self.auth_mode {
            AuthMode::Keyed => self.api_key.as_deref().filter(|k| !k.trim().is_empty()),
            AuthMode::None => None,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("auth_mode", &self.auth_mode)
            .field("kind", &self.kind)
            .finish()
    }
}
