//! Aggregate statistics and backend comparison.

use super::metric::Metric;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive time window used to filter metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Earliest timestamp included.
    pub start: DateTime<Utc>,
    /// Latest timestamp included.
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a range from two bounds.
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Range covering the last `duration` up to now.
    #[must_use]
    pub fn last(duration: chrono::Duration) -> Self {
        let end = Utc::now();
        Self {
            start: end - duration,
            end,
        }
    }

    /// Whether a timestamp falls within the range, bounds included.
    #[must_use]
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

/// Value at percentile `p` of an ascending slice.
///
/// Uses `index = clamp(ceil(p / 100 * n) - 1, 0, n - 1)`; an empty slice
/// yields 0.
#[must_use]
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let rank = (p / 100.0 * n as f64).ceil() as i64 - 1;
    let index = rank.clamp(0, n as i64 - 1) as usize;
    sorted[index]
}

/// Aggregate statistics over a set of metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedStats {
    /// Number of metrics.
    pub total_requests: usize,
    /// Successful attempts.
    pub success_count: usize,
    /// Failed attempts.
    pub failure_count: usize,
    /// Arithmetic mean of elapsed times.
    pub mean_ms: f64,
    /// Median elapsed time.
    pub p50_ms: f64,
    /// 95th percentile elapsed time.
    pub p95_ms: f64,
    /// 99th percentile elapsed time.
    pub p99_ms: f64,
    /// Fastest attempt.
    pub min_ms: f64,
    /// Slowest attempt.
    pub max_ms: f64,
    /// `failure_count / total_requests`, 0 when empty.
    pub error_rate: f64,
}

impl AggregatedStats {
    /// Computes statistics over the given metrics. Empty input gives all zeros.
    pub fn from_metrics<'a>(metrics: impl IntoIterator<Item = &'a Metric>) -> Self {
        let mut elapsed = Vec::new();
        let mut success_count = 0;
        for metric in metrics {
            elapsed.push(metric.elapsed_ms);
            if metric.success {
                success_count += 1;
            }
        }

        let total_requests = elapsed.len();
        if total_requests == 0 {
            return Self::default();
        }

        let mean_ms = elapsed.iter().sum::<f64>() / total_requests as f64;
        elapsed.sort_by(f64::total_cmp);
        let failure_count = total_requests - success_count;

        Self {
            total_requests,
            success_count,
            failure_count,
            mean_ms,
            p50_ms: percentile(&elapsed, 50.0),
            p95_ms: percentile(&elapsed, 95.0),
            p99_ms: percentile(&elapsed, 99.0),
            min_ms: elapsed[0],
            max_ms: elapsed[total_requests - 1],
            error_rate: failure_count as f64 / total_requests as f64,
        }
    }

    /// `success_count / total_requests`, 0 when empty.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.total_requests as f64
    }
}

/// Relative delta `(baseline - candidate) / baseline * 100`, 0 when baseline is 0.
fn relative_improvement(baseline: f64, candidate: f64) -> f64 {
    if baseline == 0.0 {
        return 0.0;
    }
    (baseline - candidate) / baseline * 100.0
}

/// What the comparison suggests doing with the rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationRecommendation {
    /// Primary is at least as fast and reliable: widen the rollout.
    IncreaseRollout,
    /// Mixed results: keep the current percentage.
    Hold,
    /// Primary is failing beyond threshold and worse than legacy.
    RollBack,
    /// Not enough samples on one side to judge.
    InsufficientData,
}

impl fmt::Display for MigrationRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationRecommendation::IncreaseRollout => write!(f, "increase_rollout"),
            MigrationRecommendation::Hold => write!(f, "hold"),
            MigrationRecommendation::RollBack => write!(f, "roll_back"),
            MigrationRecommendation::InsufficientData => write!(f, "insufficient_data"),
        }
    }
}

/// Side-by-side comparison of the two backends over one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Primary backend statistics.
    pub primary: AggregatedStats,
    /// Legacy backend statistics.
    pub legacy: AggregatedStats,
    /// Percent by which primary's mean is faster than legacy's (positive = faster).
    pub response_time_improvement: f64,
    /// Percent by which primary's error rate is lower than legacy's.
    pub error_rate_improvement: f64,
    /// Percent by which primary's success rate is higher than legacy's.
    pub success_rate_improvement: f64,
    /// Suggested rollout action.
    pub recommendation: MigrationRecommendation,
}

impl Comparison {
    /// Compares primary against legacy.
    ///
    /// `min_samples` is the per-backend sample floor for a recommendation and
    /// `max_error_rate` the error ratio beyond which primary is rolled back.
    #[must_use]
    pub fn new(
        primary: AggregatedStats,
        legacy: AggregatedStats,
        min_samples: usize,
        max_error_rate: f64,
    ) -> Self {
        let response_time_improvement = relative_improvement(legacy.mean_ms, primary.mean_ms);
        let error_rate_improvement = relative_improvement(legacy.error_rate, primary.error_rate);
        let success_rate_improvement = if legacy.success_rate() == 0.0 {
            0.0
        } else {
            (primary.success_rate() - legacy.success_rate()) / legacy.success_rate() * 100.0
        };

        let recommendation = if primary.total_requests < min_samples
            || legacy.total_requests < min_samples
        {
            MigrationRecommendation::InsufficientData
        } else if primary.error_rate > max_error_rate && primary.error_rate > legacy.error_rate {
            MigrationRecommendation::RollBack
        } else if primary.mean_ms <= legacy.mean_ms && primary.error_rate <= legacy.error_rate {
            MigrationRecommendation::IncreaseRollout
        } else {
            MigrationRecommendation::Hold
        };

        Self {
            primary,
            legacy,
            response_time_improvement,
            error_rate_improvement,
            success_rate_improvement,
            recommendation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiftgate_abstraction::Backend;

    fn metrics(elapsed: &[f64], failures: usize) -> Vec<Metric> {
        elapsed
            .iter()
            .enumerate()
            .map(|(i, ms)| {
                if i < failures {
                    Metric::failure(Backend::Primary, "GET /x", *ms, "boom")
                } else {
                    Metric::success(Backend::Primary, "GET /x", *ms)
                }
            })
            .collect()
    }

    #[test]
    fn test_percentile_ceiling_index() {
        assert_eq!(percentile(&[50.0, 100.0, 150.0, 200.0, 250.0], 95.0), 250.0);
        assert_eq!(percentile(&[100.0, 150.0, 200.0, 250.0], 95.0), 250.0);
        // ceil(0.5 * 4) - 1 = 1, not an interpolated median
        assert_eq!(percentile(&[100.0, 150.0, 200.0, 250.0], 50.0), 150.0);
        assert_eq!(percentile(&[7.0], 99.0), 7.0);
        assert_eq!(percentile(&[7.0, 8.0], 0.0), 7.0);
        assert_eq!(percentile(&[], 95.0), 0.0);
    }

    #[test]
    fn test_percentile_differs_from_rounding_rank() {
        // 20 samples: ceil(0.95 * 20) - 1 = 18
        let sorted: Vec<f64> = (1..=20).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 95.0), 19.0);
        // 101 samples: ceil(0.99 * 101) - 1 = 99
        let sorted: Vec<f64> = (0..=100).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 99.0), 99.0);
    }

    #[test]
    fn test_stats_over_unsorted_input() {
        let stats = AggregatedStats::from_metrics(&metrics(&[250.0, 50.0, 200.0, 100.0, 150.0], 1));
        assert_eq!(stats.total_requests, 5);
        assert_eq!(stats.success_count, 4);
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.mean_ms, 150.0);
        assert_eq!(stats.p50_ms, 150.0);
        assert_eq!(stats.p95_ms, 250.0);
        assert_eq!(stats.p99_ms, 250.0);
        assert_eq!(stats.min_ms, 50.0);
        assert_eq!(stats.max_ms, 250.0);
        assert_eq!(stats.error_rate, 0.2);
        assert_eq!(stats.success_rate(), 0.8);
    }

    #[test]
    fn test_empty_stats_are_zero() {
        let stats = AggregatedStats::from_metrics(std::iter::empty());
        assert_eq!(stats, AggregatedStats::default());
        assert_eq!(stats.error_rate, 0.0);
        assert!(!stats.error_rate.is_nan());
        assert_eq!(stats.success_rate(), 0.0);
    }

    #[test]
    fn test_time_range_is_inclusive() {
        let start = Utc::now();
        let end = start + chrono::Duration::seconds(10);
        let range = TimeRange::new(start, end);
        assert!(range.contains(start));
        assert!(range.contains(end));
        assert!(!range.contains(end + chrono::Duration::milliseconds(1)));
        assert!(!range.contains(start - chrono::Duration::milliseconds(1)));
    }

    #[test]
    fn test_comparison_improvements() {
        let primary = AggregatedStats::from_metrics(&metrics(&[50.0, 50.0, 50.0, 50.0], 0));
        let legacy = AggregatedStats::from_metrics(&metrics(&[100.0, 100.0, 100.0, 100.0], 2));
        let comparison = Comparison::new(primary, legacy, 4, 0.05);

        assert_eq!(comparison.response_time_improvement, 50.0);
        assert_eq!(comparison.error_rate_improvement, 100.0);
        assert_eq!(comparison.success_rate_improvement, 100.0);
        assert_eq!(comparison.recommendation, MigrationRecommendation::IncreaseRollout);
    }

    #[test]
    fn test_comparison_guards_division_by_zero() {
        let primary = AggregatedStats::from_metrics(&metrics(&[10.0], 1));
        let legacy = AggregatedStats::default();
        let comparison = Comparison::new(primary, legacy, 1, 0.05);

        assert_eq!(comparison.response_time_improvement, 0.0);
        assert_eq!(comparison.error_rate_improvement, 0.0);
        assert_eq!(comparison.success_rate_improvement, 0.0);
        assert!(comparison.response_time_improvement.is_finite());
        assert_eq!(comparison.recommendation, MigrationRecommendation::InsufficientData);
    }

    #[test]
    fn test_comparison_recommends_rollback() {
        let primary = AggregatedStats::from_metrics(&metrics(&[10.0; 10], 3));
        let legacy = AggregatedStats::from_metrics(&metrics(&[20.0; 10], 0));
        let comparison = Comparison::new(primary, legacy, 10, 0.05);
        assert_eq!(comparison.recommendation, MigrationRecommendation::RollBack);
        assert!(comparison.response_time_improvement > 0.0);
    }

    #[test]
    fn test_comparison_holds_on_mixed_results() {
        let primary = AggregatedStats::from_metrics(&metrics(&[30.0; 10], 0));
        let legacy = AggregatedStats::from_metrics(&metrics(&[20.0; 10], 0));
        let comparison = Comparison::new(primary, legacy, 10, 0.05);
        assert_eq!(comparison.recommendation, MigrationRecommendation::Hold);
        assert!(comparison.response_time_improvement < 0.0);
    }
}
