//! Backend abstraction layer for shiftgate.
//!
//! This crate defines the seams the gateway routes across: the two backend
//! protocols (a primary HTTP protocol and a legacy query protocol), the request
//! payload each one accepts, and the feature-flag oracle that drives rollout
//! decisions. Nothing here performs I/O.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Subject identifier used when a routing context carries none.
pub const ANONYMOUS_SUBJECT: &str = "anonymous";

/// The two backends a logical request can be served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The new protocol being rolled out.
    Primary,
    /// The proven legacy query protocol.
    Legacy,
}

impl Backend {
    /// Returns the backend a fallback attempt would use.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Backend::Primary => Backend::Legacy,
            Backend::Legacy => Backend::Primary,
        }
    }

    /// Capitalized name used in operator-facing messages.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Backend::Primary => "Primary",
            Backend::Legacy => "Legacy",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Primary => write!(f, "primary"),
            Backend::Legacy => write!(f, "legacy"),
        }
    }
}

/// Deployment environment of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development.
    #[default]
    Development,
    /// Pre-production.
    Staging,
    /// Production traffic.
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Error returned when an environment tag is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown environment '{0}'. Valid options: development, staging, production")]
pub struct ParseEnvironmentError(pub String);

impl FromStr for Environment {
    type Err = ParseEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ParseEnvironmentError(s.to_string())),
        }
    }
}

/// Caller context a routing decision is computed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingContext {
    /// Opaque subject identifier (user, tenant, device...).
    pub subject_id: Option<String>,
    /// Environment tag.
    pub environment: Environment,
    /// Free-form attributes forwarded to the flag oracle.
    pub attributes: BTreeMap<String, String>,
    /// When the context was built.
    pub evaluated_at: DateTime<Utc>,
}

impl RoutingContext {
    /// Creates an anonymous context for the given environment.
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        Self {
            subject_id: None,
            environment,
            attributes: BTreeMap::new(),
            evaluated_at: Utc::now(),
        }
    }

    /// Sets the subject identifier.
    #[must_use]
    pub fn with_subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    /// Adds a custom attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns the subject identifier, or the anonymous literal when absent.
    #[must_use]
    pub fn subject_or_anonymous(&self) -> &str {
        self.subject_id.as_deref().unwrap_or(ANONYMOUS_SUBJECT)
    }
}

impl Default for RoutingContext {
    fn default() -> Self {
        Self::new(Environment::default())
    }
}

/// HTTP method of a primary-shaped request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Payload for the primary (HTTP) backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Path appended to the configured base URL.
    pub path: String,
    /// Query parameters. `Null` values are skipped when encoding.
    #[serde(default)]
    pub query: BTreeMap<String, Value>,
    /// JSON body for non-GET methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl PrimaryRequest {
    /// Creates a request with the given method and path.
    #[must_use]
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            body: None,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// Creates a POST request with a JSON body.
    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, path).with_body(body)
    }

    /// Creates a PUT request with a JSON body.
    #[must_use]
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Put, path).with_body(body)
    }

    /// Creates a PATCH request with a JSON body.
    #[must_use]
    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Patch, path).with_body(body)
    }

    /// Creates a DELETE request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Endpoint identifier used in metrics, e.g. `GET /inventory/stock`.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Payload for the legacy query backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyQuery {
    /// Free-form query document.
    pub query: String,
    /// Query variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    /// Operation name, when the document holds several operations.
    #[serde(default, rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl LegacyQuery {
    /// Creates a query without variables.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            operation_name: None,
        }
    }

    /// Sets the query variables.
    #[must_use]
    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Sets the operation name.
    #[must_use]
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Operation identifier used in metrics.
    #[must_use]
    pub fn endpoint(&self) -> String {
        self.operation_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| ANONYMOUS_SUBJECT.to_string())
    }
}

/// One entry of a legacy result's errors array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyErrorEntry {
    /// Error message.
    pub message: String,
    /// Optional protocol-specific details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

/// Raw result returned by a legacy executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyResult {
    /// Result payload.
    #[serde(default)]
    pub data: Option<Value>,
    /// Errors reported alongside (or instead of) data.
    #[serde(default)]
    pub errors: Vec<LegacyErrorEntry>,
}

impl LegacyResult {
    /// Creates a successful result.
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Creates a result carrying a single error.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            data: None,
            errors: vec![LegacyErrorEntry {
                message: message.into(),
                extensions: None,
            }],
        }
    }

    /// Message of the first reported error, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(|e| e.message.as_str())
    }
}

/// Errors raised while executing against a backend.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendError {
    /// Non-2xx HTTP status.
    #[error("{message}")]
    Http {
        /// Status code.
        status: u16,
        /// Message from the response body, or a generic status line.
        message: String,
    },

    /// The attempt did not complete within the configured timeout.
    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Network or connection failure.
    #[error("{0}")]
    Transport(String),

    /// The legacy protocol reported an error.
    #[error("{0}")]
    Legacy(String),

    /// Request or response could not be (de)serialized.
    #[error("Serialization Error: {0}")]
    Serialization(String),

    /// The request could not be built (e.g. malformed URL).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Executor for the primary (HTTP) backend.
#[async_trait]
pub trait PrimaryBackend: Send + Sync {
    /// Executes a primary-shaped request and returns the decoded JSON payload.
    ///
    /// # Errors
    /// Returns a `BackendError` for non-2xx responses, transport failures or
    /// undecodable bodies.
    async fn execute(&self, request: &PrimaryRequest) -> Result<Value, BackendError>;

    /// Human-readable backend name for logs.
    fn name(&self) -> &str;
}

/// Executor for the legacy query backend.
#[async_trait]
pub trait LegacyExecutor: Send + Sync {
    /// Executes a legacy query.
    ///
    /// Protocol-level errors are returned inside `LegacyResult::errors`;
    /// `Err` is reserved for failures to reach the backend at all.
    async fn execute(&self, query: &LegacyQuery) -> Result<LegacyResult, BackendError>;
}

/// Errors raised by a flag oracle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlagError {
    /// The flag service could not be reached.
    #[error("Flag service unavailable: {0}")]
    Unavailable(String),

    /// The flag key is not defined.
    #[error("Unknown flag: {0}")]
    UnknownFlag(String),

    /// Other evaluation errors.
    #[error("Flag evaluation error: {0}")]
    Other(String),
}

/// Result of evaluating one flag for a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagEvaluation {
    /// Whether the flag is on for the context.
    pub enabled: bool,
    /// Selected variant, for multi-variant flags.
    pub variant: Option<String>,
    /// Why the oracle produced this answer.
    pub reason: String,
}

impl FlagEvaluation {
    /// An enabled evaluation without a variant.
    #[must_use]
    pub fn enabled(reason: impl Into<String>) -> Self {
        Self {
            enabled: true,
            variant: None,
            reason: reason.into(),
        }
    }

    /// A disabled evaluation.
    #[must_use]
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            enabled: false,
            variant: None,
            reason: reason.into(),
        }
    }

    /// An enabled evaluation carrying a variant.
    #[must_use]
    pub fn variant(variant: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            enabled: true,
            variant: Some(variant.into()),
            reason: reason.into(),
        }
    }
}

/// External feature-flag evaluation service.
///
/// Implementations may perform I/O; the router treats every error as a
/// signal to fall back to the legacy backend.
#[async_trait]
pub trait FlagOracle: Send + Sync {
    /// Evaluates a flag for the given context.
    async fn evaluate(
        &self,
        flag_key: &str,
        context: &RoutingContext,
    ) -> Result<FlagEvaluation, FlagError>;

    /// Returns whether a boolean flag is on for the given context.
    async fn is_enabled(&self, flag_key: &str, context: &RoutingContext) -> Result<bool, FlagError> {
        Ok(self.evaluate(flag_key, context).await?.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backend_other() {
        assert_eq!(Backend::Primary.other(), Backend::Legacy);
        assert_eq!(Backend::Legacy.other(), Backend::Primary);
        assert_eq!(Backend::Primary.to_string(), "primary");
        assert_eq!(Backend::Legacy.label(), "Legacy");
    }

    #[test]
    fn test_environment_from_str() {
        assert_eq!("production".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("Staging".parse::<Environment>(), Ok(Environment::Staging));
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn test_context_defaults_to_anonymous() {
        let ctx = RoutingContext::new(Environment::Staging);
        assert_eq!(ctx.subject_or_anonymous(), "anonymous");

        let ctx = ctx.with_subject("operator-7").with_attribute("site", "north");
        assert_eq!(ctx.subject_or_anonymous(), "operator-7");
        assert_eq!(ctx.attributes.get("site").map(String::as_str), Some("north"));
    }

    #[test]
    fn test_endpoint_identifiers() {
        let req = PrimaryRequest::get("/inventory/stock").with_param("limit", 10);
        assert_eq!(req.endpoint(), "GET /inventory/stock");

        let query = LegacyQuery::new("query { stock { code } }");
        assert_eq!(query.endpoint(), "anonymous");
        assert_eq!(query.with_operation_name("GetStock").endpoint(), "GetStock");
    }

    #[test]
    fn test_legacy_result_first_error_wins() {
        let mut result = LegacyResult::error("first");
        result.errors.push(LegacyErrorEntry {
            message: "second".to_string(),
            extensions: None,
        });
        assert_eq!(result.first_error(), Some("first"));
        assert_eq!(LegacyResult::ok(json!({})).first_error(), None);
    }

    #[test]
    fn test_legacy_result_deserializes_wire_shape() {
        let result: LegacyResult =
            serde_json::from_value(json!({"data": null, "errors": [{"message": "boom"}]})).unwrap();
        assert_eq!(result.first_error(), Some("boom"));
    }

    struct StaticOracle;

    #[async_trait]
    impl FlagOracle for StaticOracle {
        async fn evaluate(
            &self,
            flag_key: &str,
            _context: &RoutingContext,
        ) -> Result<FlagEvaluation, FlagError> {
            if flag_key == "on" {
                Ok(FlagEvaluation::enabled("static"))
            } else {
                Err(FlagError::UnknownFlag(flag_key.to_string()))
            }
        }
    }

    #[tokio::test]
    async fn test_is_enabled_defaults_to_evaluate() {
        let ctx = RoutingContext::default();
        assert_eq!(StaticOracle.is_enabled("on", &ctx).await, Ok(true));
        assert!(StaticOracle.is_enabled("off", &ctx).await.is_err());
    }
}
