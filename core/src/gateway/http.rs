//! Shared HTTP transport
//!
//! Owns the single `reqwest::Client` of a gateway and runs every request
//! through [`execute_with_backoff`].

use std::sync::Arc;

use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::HttpConfig;
use crate::credential::Credential;
use crate::error::{ApiError, ApiResult, ClassifiedError, ErrorCode, Result};
use crate::logging::RequestLogger;
use crate::normalize::classify_error;
use crate::retry::{RetryConfig, execute_with_backoff};

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
    logger: Arc<dyn RequestLogger>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(
        credential: &Credential,
        http: &HttpConfig,
        retry: RetryConfig,
        logger: Arc<dyn RequestLogger>,
    ) -> Result<Self> {
        let headers = default_headers(credential).map_err(|e| classify_error(&e))?;
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(http.user_agent.clone())
            .timeout(http.timeout())
            .build()
            .map_err(|e| {
                classify_error(&ApiError::InvalidConfig(format!(
                    "could not build HTTP client: {e}"
                )))
            })?;

        Ok(Self {
            client,
            base_url: credential.endpoint().to_string(),
            retry,
            logger,
        })
    }

    /// Send one request (with retries) and return the decoded JSON body.
    ///
    /// An empty success body decodes to `Value::Null`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
        label: &str,
    ) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        execute_with_backoff(
            || self.send_once(method.clone(), &url, query, body),
            &self.retry,
            self.logger.as_ref(),
            label,
        )
        .await
    }

    pub async fn get(&self, path: &str, query: &[(String, String)], label: &str) -> Result<Value> {
        self.request(Method::GET, path, query, None, label).await
    }

    pub async fn post(&self, path: &str, body: &Value, label: &str) -> Result<Value> {
        self.request(Method::POST, path, &[], Some(body), label).await
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> ApiResult<Value> {
        let mut request = self.client.request(method, url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::ApiResponse {
                status: status.as_u16(),
                message: extract_error_detail(&text),
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Parse {
            status: status.as_u16(),
            message: format!("response is not valid JSON: {e}"),
        })
    }
}

fn default_headers(credential: &Credential) -> ApiResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if let Some(key) = credential.bearer_key() {
        let mut value = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|_| ApiError::InvalidConfig("API key contains invalid characters".to_string()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

/// Pull a readable message out of an error body.
///
/// Understands `{"detail": "..."}`, FastAPI's `{"detail": [{"msg": ...}]}`,
/// `{"message": "..."}` and `{"error": "..." | {"message": ...}}`.
fn extract_error_detail(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    let detail = match json.get("detail") {
        Some(Value::String(detail)) => Some(detail.clone()),
        Some(Value::Array(entries)) => {
            let messages: Vec<&str> = entries
                .iter()
                .filter_map(|entry| entry.get("msg").and_then(Value::as_str))
                .collect();
            (!messages.is_empty()).then(|| messages.join("; "))
        }
        _ => None,
    };
    detail
        .or_else(|| json.get("message").and_then(Value::as_str).map(str::to_string))
        .or_else(|| match json.get("error") {
            Some(Value::String(error)) => Some(error.clone()),
            Some(error) => error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            None => None,
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Decode a successful body into the typed response for `label`.
///
/// An empty body is read as `{}`.
pub(crate) fn decode<T: DeserializeOwned>(value: Value, label: &str) -> Result<T> {
    let value = match value {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };
    serde_json::from_value(value).map_err(|e| {
        ClassifiedError::new(
            ErrorCode::UnexpectedError,
            format!("API_ERROR: unexpected {label} response: {e}"),
            None,
        )
    })
}
