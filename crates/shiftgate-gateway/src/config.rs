//! TOML configuration file support for the gateway.
//!
//! Every setting has a default, so an empty file (or `GatewayConfig::default()`)
//! yields a working gateway pointed at a local primary backend.

use crate::routing::FlagKeys;
use serde::{Deserialize, Serialize};
use shiftgate_abstraction::{Environment, RoutingContext};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the file.
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("Failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error.
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Unified client settings.
    pub client: ClientConfig,
    /// Metrics recorder settings.
    pub monitoring: MonitoringConfig,
    /// Flag keys the router asks the oracle about.
    pub flags: FlagKeys,
}

/// Unified client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the primary backend.
    pub base_url: String,
    /// Per-attempt timeout, applied to both backends.
    pub timeout_ms: u64,
    /// Subject the client routes on behalf of.
    pub subject_id: Option<String>,
    /// Environment tag forwarded to the flag oracle.
    pub environment: Environment,
    /// Custom attributes forwarded to the flag oracle.
    pub attributes: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            timeout_ms: 30_000,
            subject_id: None,
            environment: Environment::Development,
            attributes: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    /// Per-attempt timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Builds the routing context this client routes with.
    #[must_use]
    pub fn routing_context(&self) -> RoutingContext {
        let mut context = RoutingContext::new(self.environment);
        context.subject_id.clone_from(&self.subject_id);
        context.attributes.clone_from(&self.attributes);
        context
    }
}

/// Metrics recorder settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Maximum number of metrics kept in the ring.
    pub capacity: usize,
    /// Per-metric response time above which a warning is raised.
    pub max_response_time_ms: f64,
    /// Error ratio above which an error-rate alert is raised.
    pub max_error_rate: f64,
    /// Error ratio above which error-rate alerts are critical.
    pub critical_error_rate: f64,
    /// Per-metric complexity above which a warning is raised.
    pub max_complexity: f64,
    /// Number of recent alerts kept for inspection.
    pub alert_buffer: usize,
    /// Size of the sliding window used for the per-metric error-rate check.
    pub error_window: usize,
    /// Minimum same-backend samples in the window before alerting.
    pub min_window_samples: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            max_response_time_ms: 5_000.0,
            max_error_rate: 0.05,
            critical_error_rate: 0.10,
            max_complexity: 1_000.0,
            alert_buffer: 100,
            error_window: 100,
            min_window_samples: 20,
        }
    }
}

/// Configuration loader for gateway settings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads gateway configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<GatewayConfig> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses and validates gateway configuration from TOML text.
    ///
    /// # Errors
    /// Returns error if the text cannot be parsed or validated.
    pub fn parse(content: &str) -> Result<GatewayConfig> {
        let config: GatewayConfig = toml::from_str(content)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validates gateway configuration.
    ///
    /// # Errors
    /// Returns error if configuration is invalid.
    pub fn validate(config: &GatewayConfig) -> Result<()> {
        let client = &config.client;
        if client.base_url.trim().is_empty() {
            return Err(ConfigError::Validation("client.base_url must not be empty".to_string()));
        }
        if !(client.base_url.starts_with("http://") || client.base_url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "client.base_url '{}' must start with http:// or https://",
                client.base_url
            )));
        }
        if client.timeout_ms == 0 {
            return Err(ConfigError::Validation("client.timeout_ms must be greater than 0".to_string()));
        }

        let monitoring = &config.monitoring;
        if monitoring.capacity == 0 {
            return Err(ConfigError::Validation("monitoring.capacity must be greater than 0".to_string()));
        }
        if !monitoring.max_response_time_ms.is_finite() || monitoring.max_response_time_ms < 0.0 {
            return Err(ConfigError::Validation(format!(
                "Invalid monitoring.max_response_time_ms: {}. Must be a finite number >= 0",
                monitoring.max_response_time_ms
            )));
        }
        if !monitoring.max_complexity.is_finite() || monitoring.max_complexity < 0.0 {
            return Err(ConfigError::Validation(format!(
                "Invalid monitoring.max_complexity: {}. Must be a finite number >= 0",
                monitoring.max_complexity
            )));
        }
        for (name, rate) in [
            ("max_error_rate", monitoring.max_error_rate),
            ("critical_error_rate", monitoring.critical_error_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::Validation(format!(
                    "Invalid monitoring.{}: {}. Must be between 0.0 and 1.0",
                    name, rate
                )));
            }
        }
        if monitoring.critical_error_rate < monitoring.max_error_rate {
            return Err(ConfigError::Validation(format!(
                "monitoring.critical_error_rate ({}) must be >= monitoring.max_error_rate ({})",
                monitoring.critical_error_rate, monitoring.max_error_rate
            )));
        }
        if monitoring.error_window == 0 {
            return Err(ConfigError::Validation("monitoring.error_window must be greater than 0".to_string()));
        }

        for (name, key) in [
            ("primary_enabled", &config.flags.primary_enabled),
            ("rollout_percentage", &config.flags.rollout_percentage),
            ("fallback_allowed", &config.flags.fallback_allowed),
        ] {
            if key.trim().is_empty() {
                return Err(ConfigError::Validation(format!("flags.{} must not be empty", name)));
            }
        }

        Ok(())
    }
}
