//! Error types for the WarpGrid prober.
//!
//! None of these are fatal to probing. The manager folds every one of
//! them into `Status::Unknown` and keeps retrying.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for prober operations.
pub type ProberResult<T> = Result<T, ProberError>;

/// Errors that can occur while resolving or probing endpoints.
#[derive(Debug, Error)]
pub enum ProberError {
    #[error("failed to list endpoints: {0}")]
    Lister(String),

    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to build probe request: {0}")]
    Request(#[from] http::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid config: {0}")]
    Config(String),
}
