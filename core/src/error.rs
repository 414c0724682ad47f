//! Error types for memU operations
//!
//! Two layers:
//! - [`ApiError`] is what the HTTP transport produces (raw status, raw body).
//! - [`ClassifiedError`] is what callers see: a stable [`ErrorCode`], a
//!   user-safe message and the HTTP status when one was observed.
//!
//! The mapping between the two lives in [`crate::normalize::classify_error`].

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// Stable error codes surfaced to workflow users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AuthFailed,
    AccessDenied,
    RateLimited,
    NotFound,
    ValidationError,
    ServiceError,
    NetworkError,
    UnexpectedError,
    /// Task polling did not observe a terminal status in time
    Timeout,
    /// A destructive operation was not confirmed
    ConfirmationRequired,
}

impl ErrorCode {
    /// Machine-readable code for logging and output items
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthFailed => "AUTH_FAILED",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::RateLimited => "RATE_LIMITED",
            Self::NotFound => "NOT_FOUND",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::ServiceError => "SERVICE_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
            Self::UnexpectedError => "UNEXPECTED_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::ConfirmationRequired => "CONFIRMATION_REQUIRED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed operation as presented to the user.
///
/// Created once per failed call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ClassifiedError {
    code: ErrorCode,
    message: String,
    http_status: Option<u16>,
}

impl ClassifiedError {
    pub fn new(code: ErrorCode, message: impl Into<String>, http_status: Option<u16>) -> Self {
        Self {
            code,
            message: message.into(),
            http_status,
        }
    }

    /// Caller-side validation failure (missing or malformed input)
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message, None)
    }

    pub fn confirmation_required(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfirmationRequired, message, None)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message, None)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }
}

impl Serialize for ClassifiedError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let len = if self.http_status.is_some() { 3 } else { 2 };
        let mut state = serializer.serialize_struct("ClassifiedError", len)?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("message", &self.message)?;
        if let Some(status) = self.http_status {
            state.serialize_field("httpStatus", &status)?;
        }
        state.end()
    }
}

/// Errors produced by the HTTP transport before classification.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request never produced an HTTP response (connect, DNS, timeout).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// API returned a non-success status.
    #[error("API error ({status}): {message}")]
    ApiResponse {
        /// HTTP status code.
        status: u16,
        /// Detail extracted from the response body.
        message: String,
    },

    /// Response arrived but could not be decoded.
    #[error("Parse error ({status}): {message}")]
    Parse { status: u16, message: String },

    /// Request could not be built from the configured credential.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    /// HTTP status associated with this failure, if any.
    ///
    /// `None` marks a transport-level failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Network(err) => err.status().map(|status| status.as_u16()),
            Self::ApiResponse { status, .. } | Self::Parse { status, .. } => Some(*status),
            Self::InvalidConfig(_) => None,
        }
    }
}

/// Result type for transport calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, ClassifiedError>;

/// Fail-fast batch termination.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("batch aborted at record {index}: {error}")]
    Aborted {
        index: usize,
        #[source]
        error: ClassifiedError,
    },
}

impl BatchError {
    pub fn index(&self) -> usize {
        match self {
            Self::Aborted { index, .. } => *index,
        }
    }

    pub fn error(&self) -> &ClassifiedError {
        match self {
            Self::Aborted { error, .. } => error,
        }
    }
}
