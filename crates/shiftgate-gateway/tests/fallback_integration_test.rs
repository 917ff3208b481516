//! Integration tests for routing, single-hop fallback and attempt recording.
//!
//! Scenarios:
//! - Primary fails, legacy fallback succeeds: two metrics, legacy envelope
//! - Both backends fail: two metrics, combined error message
//! - Single-shaped requests never fall back
//! - Routing is sticky per subject and stable across rollout changes

use async_trait::async_trait;
use serde_json::{Value, json};
use shiftgate_abstraction::{
    Backend, BackendError, Environment, LegacyExecutor, LegacyQuery, LegacyResult, PrimaryBackend,
    PrimaryRequest, RoutingContext,
};
use shiftgate_gateway::{
    BackendRequest, ClientOptions, FlagKeys, InMemoryFlagOracle, MetricsRecorder, MigrationRouter,
    UnifiedClient, bucket_for,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Mock primary backend with configurable outcome.
struct MockPrimary {
    error: Option<BackendError>,
    data: Value,
    calls: AtomicUsize,
}

impl MockPrimary {
    fn new() -> Self {
        Self {
            error: None,
            data: json!({"source": "primary"}),
            calls: AtomicUsize::new(0),
        }
    }

    fn with_error(mut self, message: &str) -> Self {
        self.error = Some(BackendError::Transport(message.to_string()));
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PrimaryBackend for MockPrimary {
    async fn execute(&self, _request: &PrimaryRequest) -> Result<Value, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(self.data.clone()),
        }
    }

    fn name(&self) -> &str {
        "mock-primary"
    }
}

/// Mock legacy executor with configurable outcome and latency.
struct MockLegacy {
    result: LegacyResult,
    latency: Duration,
    calls: AtomicUsize,
}

impl MockLegacy {
    fn new() -> Self {
        Self {
            result: LegacyResult::ok(json!({"source": "legacy"})),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    fn with_error(mut self, message: &str) -> Self {
        self.result = LegacyResult::error(message);
        self
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LegacyExecutor for MockLegacy {
    async fn execute(&self, _query: &LegacyQuery) -> Result<LegacyResult, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        Ok(self.result.clone())
    }
}

fn build_client(
    percentage: u8,
    fallback: bool,
    primary: &Arc<MockPrimary>,
    legacy: &Arc<MockLegacy>,
) -> (UnifiedClient, Arc<MetricsRecorder>) {
    let oracle = InMemoryFlagOracle::with_rollout(&FlagKeys::default(), true, percentage, fallback);
    let monitor = Arc::new(MetricsRecorder::new());
    let client = UnifiedClient::new(
        Arc::new(MigrationRouter::new(Arc::new(oracle))),
        primary.clone(),
        legacy.clone(),
        monitor.clone(),
        ClientOptions {
            context: RoutingContext::new(Environment::Production).with_subject("picker-12"),
            timeout: Duration::from_secs(30),
        },
    );
    (client, monitor)
}

fn stock_request() -> BackendRequest {
    BackendRequest::dual(
        PrimaryRequest::get("/inventory/stock").with_param("site", "north"),
        LegacyQuery::new("query GetStock { stock { code qty } }").with_operation_name("GetStock"),
    )
}

#[tokio::test(start_paused = true)]
async fn test_primary_failure_falls_back_to_legacy() {
    let primary = Arc::new(MockPrimary::new().with_error("timeout"));
    let legacy = Arc::new(MockLegacy::new().with_latency(Duration::from_millis(120)));
    let (client, monitor) = build_client(100, true, &primary, &legacy);

    let response = client.request(stock_request()).await.unwrap();

    assert!(response.success);
    assert_eq!(response.backend_used, Backend::Legacy);
    assert_eq!(response.elapsed_ms, 120.0);
    assert_eq!(response.data, Some(json!({"source": "legacy"})));

    let metrics = monitor.metrics();
    assert_eq!(metrics.len(), 2);
    assert_eq!(metrics[0].backend, Backend::Primary);
    assert!(!metrics[0].success);
    assert_eq!(metrics[0].error.as_deref(), Some("timeout"));
    assert_eq!(metrics[1].backend, Backend::Legacy);
    assert!(metrics[1].success);
    assert_eq!(metrics[1].endpoint, "GetStock");
    assert_eq!(metrics[1].elapsed_ms, 120.0);
    assert_eq!(metrics[1].metadata["attempt"], "fallback");
}

#[tokio::test(start_paused = true)]
async fn test_double_failure_combines_messages() {
    let primary = Arc::new(MockPrimary::new().with_error("connection refused"));
    let legacy = Arc::new(MockLegacy::new().with_error("resolver crashed"));
    let (client, monitor) = build_client(100, true, &primary, &legacy);

    let response = client.request(stock_request()).await.unwrap();

    assert!(!response.success);
    assert_eq!(response.backend_used, Backend::Legacy);
    assert_eq!(
        response.error_message.as_deref(),
        Some("Primary API failed: connection refused. Fallback failed: resolver crashed")
    );
    assert_eq!(monitor.len(), 2);
    // One hop only
    assert_eq!(primary.calls(), 1);
    assert_eq!(legacy.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_legacy_first_double_failure_names_legacy() {
    let primary = Arc::new(MockPrimary::new().with_error("503"));
    let legacy = Arc::new(MockLegacy::new().with_error("deadlock"));
    let (client, monitor) = build_client(0, true, &primary, &legacy);

    let response = client.request(stock_request()).await.unwrap();

    assert_eq!(response.backend_used, Backend::Primary);
    assert_eq!(
        response.error_message.as_deref(),
        Some("Legacy API failed: deadlock. Fallback failed: 503")
    );
    assert_eq!(monitor.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_single_shape_never_falls_back() {
    let primary = Arc::new(MockPrimary::new().with_error("boom"));
    let legacy = Arc::new(MockLegacy::new());
    let (client, monitor) = build_client(100, true, &primary, &legacy);

    let response = client
        .primary_request(PrimaryRequest::get("/inventory/stock"))
        .await
        .unwrap();

    assert!(!response.success);
    assert_eq!(response.backend_used, Backend::Primary);
    assert_eq!(response.error_message.as_deref(), Some("boom"));
    assert_eq!(monitor.len(), 1);
    assert_eq!(legacy.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_primary_runs_legacy_only() {
    let oracle = InMemoryFlagOracle::with_rollout(&FlagKeys::default(), false, 100, true);
    let primary = Arc::new(MockPrimary::new());
    let legacy = Arc::new(MockLegacy::new().with_error("down"));
    let monitor = Arc::new(MetricsRecorder::new());
    let client = UnifiedClient::new(
        Arc::new(MigrationRouter::new(Arc::new(oracle))),
        primary.clone(),
        legacy.clone(),
        monitor.clone(),
        ClientOptions::default(),
    );

    let response = client.request(stock_request()).await.unwrap();

    // Safe default disables fallback too
    assert!(!response.success);
    assert_eq!(response.backend_used, Backend::Legacy);
    assert_eq!(primary.calls(), 0);
    assert_eq!(monitor.metrics()[0].metadata["decision_kind"], "disabled");
}

#[tokio::test]
async fn test_routing_is_sticky_per_subject() {
    let oracle = Arc::new(InMemoryFlagOracle::with_rollout(&FlagKeys::default(), true, 30, true));
    let router = MigrationRouter::new(oracle.clone());
    let context = RoutingContext::new(Environment::Production).with_subject("picker-12");

    let first = router.route(&context).await;
    for _ in 0..50 {
        assert_eq!(router.route(&context).await, first);
    }
    assert_eq!(first.bucket, Some(bucket_for("picker-12")));
}

#[tokio::test]
async fn test_raising_rollout_only_adds_subjects() {
    let keys = FlagKeys::default();
    let oracle = Arc::new(InMemoryFlagOracle::with_rollout(&keys, true, 10, true));
    let router = MigrationRouter::new(oracle.clone());
    let subjects: Vec<String> = (0..500).map(|i| format!("subject-{}", i)).collect();

    let mut previous = vec![false; subjects.len()];
    for percentage in [10, 25, 50, 75, 100] {
        oracle.set_variant(&keys.rollout_percentage, percentage.to_string());
        for (i, subject) in subjects.iter().enumerate() {
            let context = RoutingContext::new(Environment::Staging).with_subject(subject.as_str());
            let on_primary = router.route(&context).await.use_secondary_backend;
            assert!(
                on_primary || !previous[i],
                "{} left the primary cohort at {}%",
                subject,
                percentage
            );
            previous[i] = on_primary;
        }
    }
    assert!(previous.iter().all(|on_primary| *on_primary));
}

#[tokio::test]
async fn test_oracle_outage_degrades_to_legacy() {
    let oracle = Arc::new(InMemoryFlagOracle::with_rollout(&FlagKeys::default(), true, 100, true));
    oracle.set_failing(true);
    let primary = Arc::new(MockPrimary::new());
    let legacy = Arc::new(MockLegacy::new());
    let monitor = Arc::new(MetricsRecorder::new());
    let client = UnifiedClient::new(
        Arc::new(MigrationRouter::new(oracle)),
        primary.clone(),
        legacy.clone(),
        monitor,
        ClientOptions::default(),
    );

    let response = client.request(stock_request()).await.unwrap();
    assert!(response.success);
    assert_eq!(response.backend_used, Backend::Legacy);
    assert_eq!(primary.calls(), 0);
}
