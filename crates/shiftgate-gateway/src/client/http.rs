//! reqwest-backed executor for the primary HTTP backend.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use shiftgate_abstraction::{BackendError, HttpMethod, PrimaryBackend, PrimaryRequest};
use std::time::Duration;
use tracing::{debug, error};

/// Primary backend reached over HTTP at a fixed base URL.
#[derive(Debug, Clone)]
pub struct HttpPrimaryBackend {
    /// Base URL every request path is appended to.
    base_url: String,
    /// Client-level timeout.
    timeout: Duration,
    /// HTTP client for making requests.
    client: Client,
}

impl HttpPrimaryBackend {
    /// Creates a backend for `base_url` with a client-level timeout.
    ///
    /// # Errors
    /// Returns `BackendError::InvalidRequest` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::InvalidRequest(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into(),
            timeout,
            client,
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    fn method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }

    /// Query pairs for a GET request. Null parameters are skipped; strings are
    /// sent raw and other values as their JSON text.
    fn query_pairs(request: &PrimaryRequest) -> Vec<(&str, String)> {
        request
            .query
            .iter()
            .filter_map(|(key, value)| match value {
                Value::Null => None,
                Value::String(s) => Some((key.as_str(), s.clone())),
                other => Some((key.as_str(), other.to_string())),
            })
            .collect()
    }

    /// Error message for a non-2xx response.
    fn status_message(status: StatusCode, body: &str) -> String {
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| {
                format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown Status")
                )
            })
    }
}

#[async_trait]
impl PrimaryBackend for HttpPrimaryBackend {
    async fn execute(&self, request: &PrimaryRequest) -> Result<Value, BackendError> {
        let url = self.url_for(&request.path);
        debug!(method = %request.method, url = %url, "Sending primary backend request");

        let mut builder = self.client.request(Self::method(request.method), &url);
        if request.method == HttpMethod::Get {
            builder = builder.query(&Self::query_pairs(request));
        } else if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(self.timeout)
            } else {
                error!(error = %e, url = %url, "Failed to send request to primary backend");
                BackendError::Transport(format!("Network error: {}", e))
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(self.timeout)
            } else {
                BackendError::Transport(format!("Failed to read response body: {}", e))
            }
        })?;

        if !status.is_success() {
            let message = Self::status_message(status, &text);
            error!(status = %status, error = %message, "Primary backend returned error status");
            return Err(BackendError::Http {
                status: status.as_u16(),
                message,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            error!(error = %e, "Failed to parse primary backend response");
            BackendError::Serialization(format!("Failed to parse response: {}", e))
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}
