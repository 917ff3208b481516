// Error types for the gateway

use crate::config::ConfigError;
use shiftgate_abstraction::{Backend, BackendError};
use thiserror::Error;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Gateway errors surfaced to callers.
///
/// Backend failures are not in this list: they are reported inside the
/// `BackendResponse` envelope. What remains are programming and setup errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request carries no payload for any executable path.
    #[error("Invalid request shape: decision selected {decided} backend but request only carries {available}")]
    InvalidRequestShape {
        /// Backend the routing decision selected
        decided: Backend,
        /// Shapes the request actually carries
        available: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Backend could not be constructed
    #[error("Backend setup error: {0}")]
    Backend(#[from] BackendError),
}
