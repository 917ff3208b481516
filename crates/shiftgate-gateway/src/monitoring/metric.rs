//! Per-attempt outcome records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shiftgate_abstraction::Backend;
use std::collections::BTreeMap;
use thiserror::Error;

/// Metadata key carrying a request's complexity score.
pub const COMPLEXITY_KEY: &str = "complexity";

/// Reasons a metric is rejected by the recorder.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricValidationError {
    /// Endpoint identifier is empty or whitespace.
    #[error("endpoint must be a non-empty string")]
    EmptyEndpoint,

    /// Elapsed time is NaN or infinite.
    #[error("elapsed time must be finite, got {0}")]
    NonFiniteElapsed(f64),

    /// Elapsed time is negative.
    #[error("elapsed time must be >= 0, got {0}")]
    NegativeElapsed(f64),

    /// Raw telemetry could not be decoded into a metric.
    #[error("malformed metric: {0}")]
    Malformed(String),
}

/// Outcome of a single backend attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Backend the attempt ran against.
    pub backend: Backend,
    /// Endpoint or operation identifier.
    pub endpoint: String,
    /// Wall-clock duration of the attempt in milliseconds.
    pub elapsed_ms: f64,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Error message for failed attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Subject the request was made for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    /// When the metric was created.
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata (attempt, decision kind, complexity...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl Metric {
    /// Creates a success metric stamped now.
    #[must_use]
    pub fn success(backend: Backend, endpoint: impl Into<String>, elapsed_ms: f64) -> Self {
        Self {
            backend,
            endpoint: endpoint.into(),
            elapsed_ms,
            success: true,
            error: None,
            subject_id: None,
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Creates a failure metric stamped now.
    #[must_use]
    pub fn failure(
        backend: Backend,
        endpoint: impl Into<String>,
        elapsed_ms: f64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::success(backend, endpoint, elapsed_ms)
        }
    }

    /// Sets the subject identifier.
    #[must_use]
    pub fn with_subject(mut self, subject_id: Option<String>) -> Self {
        self.subject_id = subject_id;
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Merges a metadata map.
    #[must_use]
    pub fn with_metadata_map(mut self, metadata: BTreeMap<String, Value>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    /// Overrides the creation timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Complexity score carried in metadata, if numeric.
    #[must_use]
    pub fn complexity(&self) -> Option<f64> {
        self.metadata.get(COMPLEXITY_KEY).and_then(Value::as_f64)
    }

    /// Checks the structural invariants a stored metric must hold.
    ///
    /// Backend tag, success flag and timestamp validity are guaranteed by
    /// their types; raw telemetry is checked for them when decoded.
    ///
    /// # Errors
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), MetricValidationError> {
        if self.endpoint.trim().is_empty() {
            return Err(MetricValidationError::EmptyEndpoint);
        }
        if !self.elapsed_ms.is_finite() {
            return Err(MetricValidationError::NonFiniteElapsed(self.elapsed_ms));
        }
        if self.elapsed_ms < 0.0 {
            return Err(MetricValidationError::NegativeElapsed(self.elapsed_ms));
        }
        Ok(())
    }

    /// Decodes and validates a metric from raw JSON telemetry.
    ///
    /// # Errors
    /// Returns `Malformed` when a field is missing or has the wrong type
    /// (unknown backend tag, non-boolean success, unparseable timestamp),
    /// or the first violated invariant otherwise.
    pub fn from_json(raw: &Value) -> Result<Self, MetricValidationError> {
        let metric: Self = serde_json::from_value(raw.clone())
            .map_err(|e| MetricValidationError::Malformed(e.to_string()))?;
        metric.validate()?;
        Ok(metric)
    }
}
