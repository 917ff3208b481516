//! Alerts raised by the metrics recorder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shiftgate_abstraction::Backend;
use std::fmt;
use uuid::Uuid;

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Threshold crossed.
    Warning,
    /// Threshold crossed by a wide margin.
    Critical,
}

impl AlertSeverity {
    /// Severity for a value against a threshold.
    ///
    /// Strictly above the threshold is a warning, strictly above twice the
    /// threshold is critical, anything else raises nothing.
    #[must_use]
    pub fn for_threshold(value: f64, threshold: f64) -> Option<Self> {
        if value > threshold * 2.0 {
            Some(AlertSeverity::Critical)
        } else if value > threshold {
            Some(AlertSeverity::Warning)
        } else {
            None
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// What an alert is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// A single attempt was slow.
    ExecutionTime,
    /// A single request was too complex.
    Complexity,
    /// A backend is failing too often.
    ErrorRate,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::ExecutionTime => write!(f, "execution_time"),
            AlertKind::Complexity => write!(f, "complexity"),
            AlertKind::ErrorRate => write!(f, "error_rate"),
        }
    }
}

/// What triggered an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertSource {
    /// A single recorded metric.
    Metric {
        /// Backend of the metric.
        backend: Backend,
        /// Endpoint of the metric.
        endpoint: String,
        /// Creation time of the metric.
        recorded_at: DateTime<Utc>,
    },
    /// An aggregate over several metrics.
    Aggregate {
        /// Backend the aggregate covers.
        backend: Backend,
        /// Number of metrics in the aggregate.
        sample_size: usize,
        /// Observed error ratio.
        error_rate: f64,
    },
}

impl AlertSource {
    /// Backend the alert concerns.
    #[must_use]
    pub fn backend(&self) -> Backend {
        match self {
            AlertSource::Metric { backend, .. } | AlertSource::Aggregate { backend, .. } => *backend,
        }
    }
}

/// A threshold violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique identifier.
    pub id: String,
    /// Severity.
    pub severity: AlertSeverity,
    /// Alert category.
    pub kind: AlertKind,
    /// Operator-facing description.
    pub message: String,
    /// When the alert was raised.
    pub timestamp: DateTime<Utc>,
    /// Triggering metric or aggregate.
    pub source: AlertSource,
}

impl Alert {
    /// Creates an alert stamped now.
    #[must_use]
    pub fn new(
        severity: AlertSeverity,
        kind: AlertKind,
        message: impl Into<String>,
        source: AlertSource,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            severity,
            kind,
            message: message.into(),
            timestamp: Utc::now(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_severity_is_strict() {
        assert_eq!(AlertSeverity::for_threshold(5_000.0, 5_000.0), None);
        assert_eq!(AlertSeverity::for_threshold(5_001.0, 5_000.0), Some(AlertSeverity::Warning));
        assert_eq!(AlertSeverity::for_threshold(10_000.0, 5_000.0), Some(AlertSeverity::Warning));
        assert_eq!(AlertSeverity::for_threshold(10_001.0, 5_000.0), Some(AlertSeverity::Critical));
    }

    #[test]
    fn test_alert_ids_are_unique() {
        let source = AlertSource::Aggregate {
            backend: Backend::Primary,
            sample_size: 10,
            error_rate: 0.5,
        };
        let a = Alert::new(AlertSeverity::Critical, AlertKind::ErrorRate, "a", source.clone());
        let b = Alert::new(AlertSeverity::Critical, AlertKind::ErrorRate, "b", source);
        assert_ne!(a.id, b.id);
        assert_eq!(a.source.backend(), Backend::Primary);
    }

    #[test]
    fn test_alert_serializes_tagged_source() {
        let alert = Alert::new(
            AlertSeverity::Warning,
            AlertKind::ExecutionTime,
            "slow",
            AlertSource::Metric {
                backend: Backend::Legacy,
                endpoint: "GetStock".to_string(),
                recorded_at: Utc::now(),
            },
        );
        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["severity"], "warning");
        assert_eq!(value["kind"], "execution_time");
        assert_eq!(value["source"]["type"], "metric");
        assert_eq!(value["source"]["backend"], "legacy");
    }
}
