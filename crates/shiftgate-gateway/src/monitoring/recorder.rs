//! Metrics recorder for per-backend outcome tracking and alerting.

use super::alerts::{Alert, AlertKind, AlertSeverity, AlertSource};
use super::metric::Metric;
use super::stats::{AggregatedStats, Comparison, TimeRange};
use crate::config::MonitoringConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use shiftgate_abstraction::Backend;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

/// Snapshot of recorded metrics and derived statistics.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsExport {
    /// When the export was taken.
    pub exported_at: DateTime<Utc>,
    /// Metrics in the window, oldest first.
    pub metrics: Vec<Metric>,
    /// Primary backend statistics.
    pub primary: AggregatedStats,
    /// Legacy backend statistics.
    pub legacy: AggregatedStats,
    /// Backend comparison.
    pub comparison: Comparison,
}

/// Shared mutable state, always mutated under one lock.
#[derive(Debug, Default)]
struct RecorderState {
    /// Bounded FIFO of metrics, oldest first.
    ring: VecDeque<Metric>,
    /// Most recent alerts, oldest first.
    recent_alerts: VecDeque<Alert>,
}

/// Metrics recorder for both backends.
///
/// Public methods never fail: malformed metrics are logged and dropped, and
/// aggregates over empty windows are all zeros.
pub struct MetricsRecorder {
    /// Thresholds and capacities.
    config: MonitoringConfig,
    /// Ring and alert buffer.
    state: Mutex<RecorderState>,
    /// Alert event stream.
    alerts_tx: broadcast::Sender<Alert>,
}

impl MetricsRecorder {
    /// Creates a recorder with default thresholds (capacity 10,000).
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MonitoringConfig::default())
    }

    /// Creates a recorder with custom thresholds.
    ///
    /// A zero capacity is raised to 1 so the newest metric is always checked.
    #[must_use]
    pub fn with_config(mut config: MonitoringConfig) -> Self {
        config.capacity = config.capacity.max(1);
        let (alerts_tx, _) = broadcast::channel(config.alert_buffer.max(1));
        Self {
            config,
            state: Mutex::new(RecorderState::default()),
            alerts_tx,
        }
    }

    /// Thresholds in effect.
    #[must_use]
    pub fn config(&self) -> &MonitoringConfig {
        &self.config
    }

    /// Maximum number of metrics retained.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Number of metrics currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().ring.len()
    }

    /// Whether no metrics are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().ring.is_empty()
    }

    /// Copy of all retained metrics, oldest first.
    #[must_use]
    pub fn metrics(&self) -> Vec<Metric> {
        self.lock().ring.iter().cloned().collect()
    }

    /// Subscribes to alerts as they are raised.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.alerts_tx.subscribe()
    }

    /// Most recently raised alerts, oldest first.
    #[must_use]
    pub fn recent_alerts(&self) -> Vec<Alert> {
        self.lock().recent_alerts.iter().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        // A panic while holding the lock cannot leave the ring half-trimmed,
        // so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one attempt outcome.
    ///
    /// Returns `false` when the metric fails validation and was dropped.
    pub fn record_metric(&self, metric: Metric) -> bool {
        if let Err(e) = metric.validate() {
            error!(
                error = %e,
                backend = %metric.backend,
                endpoint = %metric.endpoint,
                "Rejected invalid metric"
            );
            return false;
        }

        let alerts = {
            let mut state = self.lock();
            state.ring.push_back(metric);
            while state.ring.len() > self.config.capacity {
                state.ring.pop_front();
            }

            let mut alerts = Vec::new();
            if let Some(metric) = state.ring.back() {
                alerts.extend(self.check_execution_time(metric));
                alerts.extend(self.check_complexity(metric));
                alerts.extend(self.check_error_window(&state.ring, metric.backend));
            }

            for alert in &alerts {
                state.recent_alerts.push_back(alert.clone());
            }
            while state.recent_alerts.len() > self.config.alert_buffer {
                state.recent_alerts.pop_front();
            }
            alerts
        };

        for alert in alerts {
            self.emit(alert);
        }
        true
    }

    /// Decodes raw JSON telemetry and records it.
    ///
    /// Returns `false` when the telemetry is malformed and was dropped.
    pub fn record_json(&self, raw: &Value) -> bool {
        match Metric::from_json(raw) {
            Ok(metric) => self.record_metric(metric),
            Err(e) => {
                error!(error = %e, "Rejected malformed metric telemetry");
                false
            }
        }
    }

    /// Records a successful attempt.
    pub fn record_success(
        &self,
        backend: Backend,
        endpoint: &str,
        elapsed_ms: f64,
        subject_id: Option<&str>,
        metadata: Option<BTreeMap<String, Value>>,
    ) -> bool {
        let metric = Metric::success(backend, endpoint, elapsed_ms)
            .with_subject(subject_id.map(str::to_string))
            .with_metadata_map(metadata.unwrap_or_default());
        self.record_metric(metric)
    }

    /// Records a failed attempt.
    pub fn record_error(
        &self,
        backend: Backend,
        endpoint: &str,
        elapsed_ms: f64,
        error: &str,
        subject_id: Option<&str>,
        metadata: Option<BTreeMap<String, Value>>,
    ) -> bool {
        let metric = Metric::failure(backend, endpoint, elapsed_ms, error)
            .with_subject(subject_id.map(str::to_string))
            .with_metadata_map(metadata.unwrap_or_default());
        self.record_metric(metric)
    }

    fn check_execution_time(&self, metric: &Metric) -> Option<Alert> {
        let threshold = self.config.max_response_time_ms;
        let severity = AlertSeverity::for_threshold(metric.elapsed_ms, threshold)?;
        Some(Alert::new(
            severity,
            AlertKind::ExecutionTime,
            format!(
                "{} backend call to '{}' took {:.0}ms (threshold {:.0}ms)",
                metric.backend.label(),
                metric.endpoint,
                metric.elapsed_ms,
                threshold
            ),
            Self::metric_source(metric),
        ))
    }

    fn check_complexity(&self, metric: &Metric) -> Option<Alert> {
        let complexity = metric.complexity()?;
        let threshold = self.config.max_complexity;
        let severity = AlertSeverity::for_threshold(complexity, threshold)?;
        Some(Alert::new(
            severity,
            AlertKind::Complexity,
            format!(
                "{} backend call to '{}' has complexity {} (threshold {})",
                metric.backend.label(),
                metric.endpoint,
                complexity,
                threshold
            ),
            Self::metric_source(metric),
        ))
    }

    /// Error-rate check over the most recent `error_window` metrics of one backend.
    fn check_error_window(&self, ring: &VecDeque<Metric>, backend: Backend) -> Option<Alert> {
        let window_start = ring.len().saturating_sub(self.config.error_window);
        let (samples, failures) = ring
            .range(window_start..)
            .filter(|m| m.backend == backend)
            .fold((0usize, 0usize), |(samples, failures), m| {
                (samples + 1, failures + usize::from(!m.success))
            });

        if samples < self.config.min_window_samples {
            return None;
        }
        let error_rate = failures as f64 / samples as f64;
        if error_rate <= self.config.max_error_rate {
            return None;
        }

        debug!(
            backend = %backend,
            samples,
            failures,
            error_rate,
            "Sliding-window error rate above threshold"
        );
        Some(self.error_rate_alert(backend, samples, error_rate, "recent window"))
    }

    fn error_rate_alert(
        &self,
        backend: Backend,
        sample_size: usize,
        error_rate: f64,
        scope: &str,
    ) -> Alert {
        let severity = if error_rate > self.config.critical_error_rate {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        Alert::new(
            severity,
            AlertKind::ErrorRate,
            format!(
                "{} backend error rate {:.1}% over {} ({} samples) exceeds {:.1}%",
                backend.label(),
                error_rate * 100.0,
                scope,
                sample_size,
                self.config.max_error_rate * 100.0
            ),
            AlertSource::Aggregate {
                backend,
                sample_size,
                error_rate,
            },
        )
    }

    fn metric_source(metric: &Metric) -> AlertSource {
        AlertSource::Metric {
            backend: metric.backend,
            endpoint: metric.endpoint.clone(),
            recorded_at: metric.timestamp,
        }
    }

    fn emit(&self, alert: Alert) {
        match alert.severity {
            AlertSeverity::Critical => error!(
                alert_id = %alert.id,
                kind = %alert.kind,
                backend = %alert.source.backend(),
                "{}",
                alert.message
            ),
            AlertSeverity::Warning => warn!(
                alert_id = %alert.id,
                kind = %alert.kind,
                backend = %alert.source.backend(),
                "{}",
                alert.message
            ),
        }
        // No subscribers is fine: the alert is already logged and buffered.
        let _ = self.alerts_tx.send(alert);
    }

    fn filtered(&self, backend: Option<Backend>, time_range: Option<TimeRange>) -> Vec<Metric> {
        self.lock()
            .ring
            .iter()
            .filter(|m| backend.is_none_or(|b| m.backend == b))
            .filter(|m| time_range.is_none_or(|r| r.contains(m.timestamp)))
            .cloned()
            .collect()
    }

    /// Aggregate statistics, optionally for one backend and/or time window.
    #[must_use]
    pub fn get_stats(&self, backend: Option<Backend>, time_range: Option<TimeRange>) -> AggregatedStats {
        AggregatedStats::from_metrics(&self.filtered(backend, time_range))
    }

    /// Compares the two backends over the same window.
    #[must_use]
    pub fn compare_apis(&self, time_range: Option<TimeRange>) -> Comparison {
        let window = self.filtered(None, time_range);
        let primary = AggregatedStats::from_metrics(window.iter().filter(|m| m.backend == Backend::Primary));
        let legacy = AggregatedStats::from_metrics(window.iter().filter(|m| m.backend == Backend::Legacy));
        Comparison::new(
            primary,
            legacy,
            self.config.min_window_samples,
            self.config.max_error_rate,
        )
    }

    /// Re-evaluates the error-rate threshold per backend over a window.
    ///
    /// Produces at most one alert per backend. These alerts are returned, not
    /// emitted.
    #[must_use]
    pub fn get_alerts(&self, time_range: Option<TimeRange>) -> Vec<Alert> {
        [Backend::Primary, Backend::Legacy]
            .into_iter()
            .filter_map(|backend| {
                let stats = self.get_stats(Some(backend), time_range);
                (stats.total_requests > 0 && stats.error_rate > self.config.max_error_rate).then(|| {
                    self.error_rate_alert(backend, stats.total_requests, stats.error_rate, "window")
                })
            })
            .collect()
    }

    /// Exports metrics and derived statistics for a window.
    #[must_use]
    pub fn export_metrics(&self, time_range: Option<TimeRange>) -> MetricsExport {
        let metrics = self.filtered(None, time_range);
        let primary = AggregatedStats::from_metrics(metrics.iter().filter(|m| m.backend == Backend::Primary));
        let legacy = AggregatedStats::from_metrics(metrics.iter().filter(|m| m.backend == Backend::Legacy));
        let comparison = Comparison::new(
            primary.clone(),
            legacy.clone(),
            self.config.min_window_samples,
            self.config.max_error_rate,
        );
        MetricsExport {
            exported_at: Utc::now(),
            metrics,
            primary,
            legacy,
            comparison,
        }
    }

    /// Drops every retained metric and buffered alert.
    pub fn clear_metrics(&self) {
        let mut state = self.lock();
        state.ring.clear();
        state.recent_alerts.clear();
        debug!("Cleared recorded metrics");
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
