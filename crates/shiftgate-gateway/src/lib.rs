//! Progressive migration gateway for shiftgate.
//!
//! Routes each logical request to either the primary or the legacy backend,
//! shifts traffic by a flag-controlled rollout percentage, falls back to the
//! other backend at most once on failure, and records every attempt so the two
//! paths can be compared and alerted on.
//!
//! The three components are built and wired explicitly:
//!
//! ```no_run
//! use shiftgate_gateway::{GatewayConfig, InMemoryFlagOracle, MetricsRecorder, UnifiedClient};
//! # use shiftgate_abstraction::{BackendError, LegacyExecutor, LegacyQuery, LegacyResult};
//! # struct Legacy;
//! # #[async_trait::async_trait]
//! # impl LegacyExecutor for Legacy {
//! #     async fn execute(&self, _q: &LegacyQuery) -> Result<LegacyResult, BackendError> {
//! #         Ok(LegacyResult::default())
//! #     }
//! # }
//! use std::sync::Arc;
//!
//! # async fn run() -> shiftgate_gateway::Result<()> {
//! let config = GatewayConfig::default();
//! let monitor = Arc::new(MetricsRecorder::with_config(config.monitoring.clone()));
//! let oracle = Arc::new(InMemoryFlagOracle::with_rollout(&config.flags, true, 25, true));
//! let client = UnifiedClient::from_config(&config, oracle, Arc::new(Legacy), monitor)?;
//!
//! let response = client.query("query { stock { code } }", None).await?;
//! assert!(response.success || response.error_message.is_some());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod monitoring;
pub mod routing;

pub use client::{BackendRequest, BackendResponse, ClientOptions, HttpPrimaryBackend, UnifiedClient};
pub use config::{ClientConfig, ConfigError, ConfigLoader, GatewayConfig, MonitoringConfig};
pub use error::{GatewayError, Result};
pub use monitoring::{
    AggregatedStats, Alert, AlertKind, AlertSeverity, AlertSource, Comparison, Metric,
    MetricValidationError, MetricsExport, MetricsRecorder, MigrationRecommendation, TimeRange,
};
pub use routing::{
    DecisionKind, FlagKeys, InMemoryFlagOracle, MigrationRouter, RoutingDecision, bucket_for,
    should_use_secondary,
};
