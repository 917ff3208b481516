//! Rollout routing between the primary and legacy backends.
//!
//! The router asks a flag oracle whether the primary backend is enabled,
//! which percentage of subjects it is rolled out to and whether fallback is
//! allowed, then places the subject in a sticky cohort with a deterministic
//! hash.

pub mod bucketing;
pub mod flags;
pub mod router;
pub mod types;

pub use bucketing::{bucket_for, should_use_secondary};
pub use flags::{FlagKeys, InMemoryFlagOracle};
pub use router::MigrationRouter;
pub use types::{DecisionKind, RoutingDecision};
