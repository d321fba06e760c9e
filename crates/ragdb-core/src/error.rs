//! Error taxonomy shared by every ragdb crate.
//!
//! Configuration and validation failures are raised before any external call.
//! Everything that goes wrong while talking to the embedding provider or the
//! vector store is reported as `Upstream`, `Timeout` or `Unavailable` so
//! callers can tell a bad request from a broken dependency.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{service} request failed: {cause}")]
    Upstream { service: String, cause: String },

    #[error("{service} did not answer within {timeout_ms} ms")]
    Timeout { service: String, timeout_ms: u64 },

    #[error("Cannot reach {service}: {cause}")]
    Unavailable { service: String, cause: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    pub fn upstream(service: impl Into<String>, cause: impl ToString) -> Self {
        Self::Upstream { service: service.into(), cause: cause.to_string() }
    }

    pub fn unavailable(service: impl Into<String>, cause: impl ToString) -> Self {
        Self::Unavailable { service: service.into(), cause: cause.to_string() }
    }

    /// True for failures that originate in an external service.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream { .. } | Self::Timeout { .. } | Self::Unavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
