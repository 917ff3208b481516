//! Unified client: route, execute, fall back once, record every attempt.

use super::http::HttpPrimaryBackend;
use super::request::{BackendRequest, BackendResponse};
use crate::config::{ClientConfig, ConfigLoader, GatewayConfig};
use crate::error::{GatewayError, Result};
use crate::monitoring::{Metric, MetricsRecorder};
use crate::routing::{MigrationRouter, RoutingDecision};
use chrono::Utc;
use serde_json::Value;
use shiftgate_abstraction::{
    Backend, BackendError, FlagOracle, LegacyExecutor, LegacyQuery, PrimaryBackend, PrimaryRequest,
    RoutingContext,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Per-client settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Context every request is routed with.
    pub context: RoutingContext,
    /// Per-attempt timeout, applied to both backends.
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            context: RoutingContext::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&ClientConfig> for ClientOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            context: config.routing_context(),
            timeout: config.timeout(),
        }
    }
}

/// Which attempt of a logical request is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Initial,
    Fallback,
}

impl Attempt {
    fn as_str(self) -> &'static str {
        match self {
            Attempt::Initial => "initial",
            Attempt::Fallback => "fallback",
        }
    }
}

/// Payload selected for one attempt.
#[derive(Debug, Clone, Copy)]
enum Payload<'a> {
    Primary(&'a PrimaryRequest),
    Legacy(&'a LegacyQuery),
}

impl<'a> Payload<'a> {
    fn select(request: &'a BackendRequest, backend: Backend) -> Option<Self> {
        match backend {
            Backend::Primary => request.primary().map(Payload::Primary),
            Backend::Legacy => request.legacy().map(Payload::Legacy),
        }
    }

    fn backend(self) -> Backend {
        match self {
            Payload::Primary(_) => Backend::Primary,
            Payload::Legacy(_) => Backend::Legacy,
        }
    }

    fn endpoint(self) -> String {
        match self {
            Payload::Primary(request) => request.endpoint(),
            Payload::Legacy(query) => query.endpoint(),
        }
    }
}

/// Result of one executed attempt.
struct AttemptOutcome {
    result: std::result::Result<Value, BackendError>,
    elapsed_ms: f64,
}

/// Entry point for callers: one logical request in, one envelope out.
///
/// Backend failures never surface as errors; they are reported in the
/// returned `BackendResponse`. The only error is `InvalidRequestShape`.
pub struct UnifiedClient {
    router: Arc<MigrationRouter>,
    primary: Arc<dyn PrimaryBackend>,
    legacy: Arc<dyn LegacyExecutor>,
    monitor: Arc<MetricsRecorder>,
    options: ClientOptions,
}

impl UnifiedClient {
    /// Creates a client from its collaborators.
    #[must_use]
    pub fn new(
        router: Arc<MigrationRouter>,
        primary: Arc<dyn PrimaryBackend>,
        legacy: Arc<dyn LegacyExecutor>,
        monitor: Arc<MetricsRecorder>,
        options: ClientOptions,
    ) -> Self {
        Self {
            router,
            primary,
            legacy,
            monitor,
            options,
        }
    }

    /// Creates a client whose router and HTTP primary backend are built from
    /// configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn from_config(
        config: &GatewayConfig,
        oracle: Arc<dyn FlagOracle>,
        legacy: Arc<dyn LegacyExecutor>,
        monitor: Arc<MetricsRecorder>,
    ) -> Result<Self> {
        ConfigLoader::validate(config)?;
        let primary = HttpPrimaryBackend::new(config.client.base_url.clone(), config.client.timeout())?;
        let router = MigrationRouter::with_keys(oracle, config.flags.clone());

        info!(
            base_url = %config.client.base_url,
            timeout_ms = config.client.timeout_ms,
            "Created unified client"
        );

        Ok(Self::new(
            Arc::new(router),
            Arc::new(primary),
            legacy,
            monitor,
            ClientOptions::from(&config.client),
        ))
    }

    /// Router consulted for every request.
    #[must_use]
    pub fn router(&self) -> &Arc<MigrationRouter> {
        &self.router
    }

    /// Recorder every attempt is reported to.
    #[must_use]
    pub fn monitor(&self) -> &Arc<MetricsRecorder> {
        &self.monitor
    }

    /// Settings in effect.
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Executes a logical request.
    ///
    /// # Errors
    /// Returns `GatewayError::InvalidRequestShape` if the request carries no
    /// payload for the path the routing decision selects.
    pub async fn request(&self, request: BackendRequest) -> Result<BackendResponse> {
        self.request_with_metadata(request, BTreeMap::new()).await
    }

    /// Executes a logical request, attaching `metadata` to every recorded metric.
    ///
    /// # Errors
    /// Returns `GatewayError::InvalidRequestShape` if the request carries no
    /// payload for the path the routing decision selects.
    pub async fn request_with_metadata(
        &self,
        request: BackendRequest,
        metadata: BTreeMap<String, Value>,
    ) -> Result<BackendResponse> {
        let context = RoutingContext {
            evaluated_at: Utc::now(),
            ..self.options.context.clone()
        };
        let decision = self.router.route(&context).await;

        let initial = if decision.use_secondary_backend {
            Payload::select(&request, Backend::Primary)
                .or_else(|| Payload::select(&request, Backend::Legacy))
        } else {
            Payload::select(&request, Backend::Legacy)
        };
        let Some(initial) = initial else {
            let decided = if decision.use_secondary_backend {
                Backend::Primary
            } else {
                Backend::Legacy
            };
            error!(
                decided = %decided,
                available = request.available(),
                "Request carries no payload for the selected backend"
            );
            return Err(GatewayError::InvalidRequestShape {
                decided,
                available: request.available().to_string(),
            });
        };

        let first = self.attempt(initial, &decision, Attempt::Initial, &metadata).await;
        let first_message = match first.result {
            Ok(data) => return Ok(BackendResponse::ok(data, initial.backend(), first.elapsed_ms)),
            Err(e) => e.to_string(),
        };

        let fallback = if decision.fallback_enabled {
            Payload::select(&request, initial.backend().other())
        } else {
            None
        };
        let Some(fallback) = fallback else {
            warn!(
                backend = %initial.backend(),
                error = %first_message,
                fallback_enabled = decision.fallback_enabled,
                "Request failed without fallback"
            );
            return Ok(BackendResponse::failed(first_message, initial.backend(), first.elapsed_ms));
        };

        warn!(
            from = %initial.backend(),
            to = %fallback.backend(),
            error = %first_message,
            "Falling back to other backend"
        );

        // Single hop: the fallback outcome is final either way.
        let second = self.attempt(fallback, &decision, Attempt::Fallback, &metadata).await;
        match second.result {
            Ok(data) => Ok(BackendResponse::ok(data, fallback.backend(), second.elapsed_ms)),
            Err(e) => {
                let message = format!(
                    "{} API failed: {}. Fallback failed: {}",
                    initial.backend().label(),
                    first_message,
                    e
                );
                error!(error = %message, "Both backends failed");
                Ok(BackendResponse::failed(message, fallback.backend(), second.elapsed_ms))
            }
        }
    }

    /// Executes a primary-shaped request.
    ///
    /// # Errors
    /// Returns `GatewayError::InvalidRequestShape` when routing selects the
    /// legacy backend.
    pub async fn primary_request(&self, request: PrimaryRequest) -> Result<BackendResponse> {
        self.request(BackendRequest::Primary(request)).await
    }

    /// Executes a legacy-shaped request.
    ///
    /// # Errors
    /// Never fails in practice: a legacy payload is always executable.
    pub async fn legacy_request(&self, query: LegacyQuery) -> Result<BackendResponse> {
        self.request(BackendRequest::Legacy(query)).await
    }

    /// GET against the primary backend.
    ///
    /// # Errors
    /// See [`UnifiedClient::primary_request`].
    pub async fn get(
        &self,
        path: impl Into<String>,
        params: BTreeMap<String, Value>,
    ) -> Result<BackendResponse> {
        let mut request = PrimaryRequest::get(path);
        request.query = params;
        self.primary_request(request).await
    }

    /// Query against the legacy backend.
    ///
    /// # Errors
    /// See [`UnifiedClient::legacy_request`].
    pub async fn query(
        &self,
        query: impl Into<String>,
        variables: Option<Value>,
    ) -> Result<BackendResponse> {
        let mut query = LegacyQuery::new(query);
        query.variables = variables;
        self.legacy_request(query).await
    }

    async fn attempt(
        &self,
        payload: Payload<'_>,
        decision: &RoutingDecision,
        attempt: Attempt,
        metadata: &BTreeMap<String, Value>,
    ) -> AttemptOutcome {
        let backend = payload.backend();
        let endpoint = payload.endpoint();
        let timeout = self.options.timeout;
        let backend_name = match payload {
            Payload::Primary(_) => self.primary.name(),
            Payload::Legacy(_) => "legacy",
        };
        debug!(
            backend = %backend,
            backend_name,
            endpoint = %endpoint,
            attempt = attempt.as_str(),
            "Executing backend attempt"
        );

        let start = Instant::now();
        let result = match payload {
            Payload::Primary(request) => tokio::time::timeout(timeout, self.primary.execute(request))
                .await
                .unwrap_or_else(|_| Err(BackendError::Timeout(timeout))),
            Payload::Legacy(query) => tokio::time::timeout(timeout, self.legacy.execute(query))
                .await
                .unwrap_or_else(|_| Err(BackendError::Timeout(timeout)))
                .and_then(|result| match result.first_error() {
                    Some(message) => Err(BackendError::Legacy(message.to_string())),
                    None => Ok(result.data.unwrap_or(Value::Null)),
                }),
        };
        let elapsed_ms = start.elapsed().as_micros() as f64 / 1000.0;

        let metric = match &result {
            Ok(_) => Metric::success(backend, endpoint, elapsed_ms),
            Err(e) => Metric::failure(backend, endpoint, elapsed_ms, e.to_string()),
        }
        .with_subject(self.options.context.subject_id.clone())
        .with_metadata_map(metadata.clone())
        .with_metadata("attempt", attempt.as_str())
        .with_metadata("decision_kind", decision.kind.to_string())
        .with_metadata("rollout_percentage", decision.rollout_percentage);
        self.monitor.record_metric(metric);

        AttemptOutcome { result, elapsed_ms }
    }
}
