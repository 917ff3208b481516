//! Unified client over the primary and legacy backends.

pub mod http;
pub mod request;
pub mod unified;

pub use http::HttpPrimaryBackend;
pub use request::{BackendRequest, BackendResponse};
pub use unified::{ClientOptions, UnifiedClient};
