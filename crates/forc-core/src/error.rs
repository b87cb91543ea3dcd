//! Error types for FORC analysis

use thiserror::Error;

/// FORC analysis error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Raw data violates a physical invariant and nothing usable is left
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Run parameters outside their valid range
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Numerical step that cannot be carried out on the given data
    #[error("Computation error: {0}")]
    Computation(String),

    /// Run aborted through its cancellation token
    #[error("Run cancelled")]
    Cancelled,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
