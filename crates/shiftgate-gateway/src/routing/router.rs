//! Migration router turning flag answers into routing decisions.

use super::bucketing::{bucket_for, should_use_secondary};
use super::flags::FlagKeys;
use super::types::{DecisionKind, RoutingDecision};
use shiftgate_abstraction::{FlagError, FlagOracle, RoutingContext};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parses a rollout variant into a percentage.
///
/// Missing or unparseable variants mean 0; values outside 0-100 are clamped.
fn parse_percentage(variant: Option<&str>) -> u8 {
    variant
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map_or(0, |p| p.clamp(0, 100) as u8)
}

/// Router deciding which backend serves a request.
///
/// Holds no mutable state: the same context and the same flag answers always
/// produce the same decision.
pub struct MigrationRouter {
    /// Flag oracle consulted on every decision.
    oracle: Arc<dyn FlagOracle>,
    /// Keys of the flags to evaluate.
    keys: FlagKeys,
}

impl MigrationRouter {
    /// Creates a router using the default flag keys.
    #[must_use]
    pub fn new(oracle: Arc<dyn FlagOracle>) -> Self {
        Self::with_keys(oracle, FlagKeys::default())
    }

    /// Creates a router using custom flag keys.
    #[must_use]
    pub fn with_keys(oracle: Arc<dyn FlagOracle>, keys: FlagKeys) -> Self {
        Self { oracle, keys }
    }

    /// Flag keys this router evaluates.
    #[must_use]
    pub fn keys(&self) -> &FlagKeys {
        &self.keys
    }

    /// Computes the routing decision for a context.
    ///
    /// Never fails: a disabled primary flag or any oracle error yields the
    /// legacy-only safe default.
    pub async fn route(&self, context: &RoutingContext) -> RoutingDecision {
        let decision = match self.evaluate(context).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    error = %e,
                    subject = context.subject_or_anonymous(),
                    "Flag evaluation failed, routing to legacy backend"
                );
                RoutingDecision::safe_default(
                    DecisionKind::OracleFailure,
                    format!("Flag oracle failure ({}); routing to legacy backend", e),
                )
            }
        };

        info!(
            subject = context.subject_or_anonymous(),
            environment = %context.environment,
            use_primary = decision.use_secondary_backend,
            fallback_enabled = decision.fallback_enabled,
            rollout_percentage = decision.rollout_percentage,
            kind = %decision.kind,
            "Routing decision: {}",
            decision.reason
        );

        decision
    }

    async fn evaluate(&self, context: &RoutingContext) -> Result<RoutingDecision, FlagError> {
        let enabled = self
            .oracle
            .is_enabled(&self.keys.primary_enabled, context)
            .await?;
        if !enabled {
            return Ok(RoutingDecision::safe_default(
                DecisionKind::Disabled,
                format!(
                    "Primary backend disabled by flag '{}'; routing to legacy backend",
                    self.keys.primary_enabled
                ),
            ));
        }

        let rollout = self
            .oracle
            .evaluate(&self.keys.rollout_percentage, context)
            .await?;
        let rollout_percentage = parse_percentage(rollout.variant.as_deref());
        debug!(
            variant = ?rollout.variant,
            rollout_percentage,
            "Parsed rollout percentage"
        );

        let fallback_enabled = self
            .oracle
            .is_enabled(&self.keys.fallback_allowed, context)
            .await?;

        let subject = context.subject_or_anonymous();
        let use_secondary_backend =
            should_use_secondary(rollout_percentage, context.subject_id.as_deref());

        let (bucket, reason) = match rollout_percentage {
            0 => (
                None,
                format!("Rollout at 0%: subject '{}' stays on legacy backend", subject),
            ),
            100 => (
                None,
                format!("Rollout at 100%: subject '{}' routed to primary backend", subject),
            ),
            percentage => {
                let bucket = bucket_for(subject);
                let cohort = if use_secondary_backend { "primary" } else { "legacy" };
                (
                    Some(bucket),
                    format!(
                        "Subject '{}' landed in the {} cohort (bucket {} vs {}% rollout)",
                        subject, cohort, bucket, percentage
                    ),
                )
            }
        };

        Ok(RoutingDecision {
            use_secondary_backend,
            fallback_enabled,
            rollout_percentage,
            reason,
            kind: DecisionKind::Rollout,
            bucket,
        })
    }
}
