//! Request and response envelopes of the unified client.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shiftgate_abstraction::{Backend, LegacyQuery, PrimaryRequest};

/// One logical request, shaped for one or both backends.
///
/// Only `Dual` requests can fall back: a single-shaped request has nothing to
/// execute on the other side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendRequest {
    /// Primary-shaped payload only.
    Primary(PrimaryRequest),
    /// Legacy-shaped payload only.
    Legacy(LegacyQuery),
    /// Both payloads.
    Dual {
        /// Primary-shaped payload.
        primary: PrimaryRequest,
        /// Legacy-shaped payload.
        legacy: LegacyQuery,
    },
}

impl BackendRequest {
    /// Creates a request carrying both shapes.
    #[must_use]
    pub fn dual(primary: PrimaryRequest, legacy: LegacyQuery) -> Self {
        BackendRequest::Dual { primary, legacy }
    }

    /// Primary-shaped payload, if carried.
    #[must_use]
    pub fn primary(&self) -> Option<&PrimaryRequest> {
        match self {
            BackendRequest::Primary(primary) | BackendRequest::Dual { primary, .. } => Some(primary),
            BackendRequest::Legacy(_) => None,
        }
    }

    /// Legacy-shaped payload, if carried.
    #[must_use]
    pub fn legacy(&self) -> Option<&LegacyQuery> {
        match self {
            BackendRequest::Legacy(legacy) | BackendRequest::Dual { legacy, .. } => Some(legacy),
            BackendRequest::Primary(_) => None,
        }
    }

    /// Whether the request carries a payload for `backend`.
    #[must_use]
    pub fn supports(&self, backend: Backend) -> bool {
        match backend {
            Backend::Primary => self.primary().is_some(),
            Backend::Legacy => self.legacy().is_some(),
        }
    }

    /// Description of the carried shapes, for error messages.
    #[must_use]
    pub fn available(&self) -> &'static str {
        match self {
            BackendRequest::Primary(_) => "a primary payload",
            BackendRequest::Legacy(_) => "a legacy payload",
            BackendRequest::Dual { .. } => "primary and legacy payloads",
        }
    }
}

impl From<PrimaryRequest> for BackendRequest {
    fn from(request: PrimaryRequest) -> Self {
        BackendRequest::Primary(request)
    }
}

impl From<LegacyQuery> for BackendRequest {
    fn from(query: LegacyQuery) -> Self {
        BackendRequest::Legacy(query)
    }
}

/// Outcome of a logical request.
///
/// Backend failures are reported here rather than as errors, so callers branch
/// on `success` alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendResponse {
    /// Response payload on success.
    pub data: Option<Value>,
    /// Whether the request succeeded.
    pub success: bool,
    /// Failure description.
    pub error_message: Option<String>,
    /// Backend that produced this outcome.
    pub backend_used: Backend,
    /// Duration of the attempt that produced this outcome.
    pub elapsed_ms: f64,
}

impl BackendResponse {
    /// Creates a success envelope.
    #[must_use]
    pub fn ok(data: Value, backend_used: Backend, elapsed_ms: f64) -> Self {
        Self {
            data: Some(data),
            success: true,
            error_message: None,
            backend_used,
            elapsed_ms,
        }
    }

    /// Creates a failure envelope.
    #[must_use]
    pub fn failed(error_message: impl Into<String>, backend_used: Backend, elapsed_ms: f64) -> Self {
        Self {
            data: None,
            success: false,
            error_message: Some(error_message.into()),
            backend_used,
            elapsed_ms,
        }
    }
}
