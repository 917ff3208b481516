//! Types for rollout routing decisions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a routing decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Primary backend enabled; subject placed by rollout percentage.
    Rollout,
    /// Primary backend disabled by flag.
    Disabled,
    /// Flag oracle failed; safe default applied.
    OracleFailure,
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionKind::Rollout => write!(f, "rollout"),
            DecisionKind::Disabled => write!(f, "disabled"),
            DecisionKind::OracleFailure => write!(f, "oracle_failure"),
        }
    }
}

/// Routing decision for one request.
///
/// Always fully populated, including when the flag oracle fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Whether to execute against the primary backend.
    pub use_secondary_backend: bool,
    /// Whether one fallback attempt against the other backend is allowed.
    pub fallback_enabled: bool,
    /// Rollout percentage in effect (0-100).
    pub rollout_percentage: u8,
    /// Human-readable justification.
    pub reason: String,
    /// How the decision was reached.
    pub kind: DecisionKind,
    /// Subject's hash bucket (0-99), when hashing was needed.
    pub bucket: Option<u8>,
}

impl RoutingDecision {
    /// Legacy-only decision with fallback disabled.
    #[must_use]
    pub fn safe_default(kind: DecisionKind, reason: impl Into<String>) -> Self {
        Self {
            use_secondary_backend: false,
            fallback_enabled: false,
            rollout_percentage: 0,
            reason: reason.into(),
            kind,
            bucket: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_default_is_legacy_only() {
        let decision = RoutingDecision::safe_default(DecisionKind::OracleFailure, "oracle down");
        assert!(!decision.use_secondary_backend);
        assert!(!decision.fallback_enabled);
        assert_eq!(decision.rollout_percentage, 0);
        assert_eq!(decision.reason, "oracle down");
        assert_eq!(decision.kind, DecisionKind::OracleFailure);
        assert_eq!(decision.bucket, None);
    }
}
