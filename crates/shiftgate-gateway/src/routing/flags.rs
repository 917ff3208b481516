//! Flag keys and an in-memory flag oracle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shiftgate_abstraction::{FlagError, FlagEvaluation, FlagOracle, RoutingContext};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

/// Keys of the three flags the router evaluates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagKeys {
    /// Boolean flag: is the primary backend enabled at all.
    pub primary_enabled: String,
    /// Variant flag: rollout percentage as an integer string.
    pub rollout_percentage: String,
    /// Boolean flag: may a failed attempt fall back to the other backend.
    pub fallback_allowed: String,
}

impl Default for FlagKeys {
    fn default() -> Self {
        Self {
            primary_enabled: "api-migration.primary-enabled".to_string(),
            rollout_percentage: "api-migration.rollout-percentage".to_string(),
            fallback_allowed: "api-migration.fallback-allowed".to_string(),
        }
    }
}

/// Thread-safe in-memory flag oracle.
///
/// Flags are global (not targeted per context). Undefined flags evaluate to
/// disabled. Useful for local development and tests.
#[derive(Debug, Default)]
pub struct InMemoryFlagOracle {
    flags: RwLock<HashMap<String, FlagEvaluation>>,
    failing: AtomicBool,
}

impl InMemoryFlagOracle {
    /// Creates an oracle with no flags defined.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an oracle preloaded with a rollout configuration.
    #[must_use]
    pub fn with_rollout(keys: &FlagKeys, enabled: bool, percentage: u8, fallback: bool) -> Self {
        let oracle = Self::new();
        oracle.set_enabled(&keys.primary_enabled, enabled);
        oracle.set_variant(&keys.rollout_percentage, percentage.to_string());
        oracle.set_enabled(&keys.fallback_allowed, fallback);
        oracle
    }

    /// Defines a boolean flag.
    pub fn set_enabled(&self, key: &str, enabled: bool) {
        let evaluation = if enabled {
            FlagEvaluation::enabled("static value")
        } else {
            FlagEvaluation::disabled("static value")
        };
        self.write_flag(key, evaluation);
    }

    /// Defines a variant flag.
    pub fn set_variant(&self, key: &str, variant: impl Into<String>) {
        self.write_flag(key, FlagEvaluation::variant(variant, "static variant"));
    }

    /// Removes a flag definition.
    pub fn remove(&self, key: &str) {
        self.flags
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Makes every evaluation fail, simulating an unreachable flag service.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn write_flag(&self, key: &str, evaluation: FlagEvaluation) {
        self.flags
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), evaluation);
    }
}

#[async_trait]
impl FlagOracle for InMemoryFlagOracle {
    async fn evaluate(
        &self,
        flag_key: &str,
        _context: &RoutingContext,
    ) -> Result<FlagEvaluation, FlagError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FlagError::Unavailable("in-memory oracle set to fail".to_string()));
        }
        let flags = self.flags.read().unwrap_or_else(PoisonError::into_inner);
        Ok(flags
            .get(flag_key)
            .cloned()
            .unwrap_or_else(|| FlagEvaluation::disabled("flag not defined")))
    }
}
