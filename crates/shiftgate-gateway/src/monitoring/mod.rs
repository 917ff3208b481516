//! Per-backend metrics, aggregate statistics and threshold alerts.

pub mod alerts;
pub mod metric;
pub mod recorder;
pub mod stats;

pub use alerts::{Alert, AlertKind, AlertSeverity, AlertSource};
pub use metric::{COMPLEXITY_KEY, Metric, MetricValidationError};
pub use recorder::{MetricsExport, MetricsRecorder};
pub use stats::{AggregatedStats, Comparison, MigrationRecommendation, TimeRange, percentile};
