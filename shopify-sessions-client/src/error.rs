//! Client error types.

use shopify_sessions_store::StoreError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised by transports and the session client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failure inside the session component (in-process transport)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The remote function ran and reported an error
    #[error("Function {function} failed: {message}")]
    Remote {
        /// Function path
        function: String,
        /// Error message reported by the backend
        message: String,
    },

    /// The call never produced a function result
    #[error("Transport error: {0}")]
    Transport(String),

    /// Underlying HTTP client error
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Result did not have the expected shape
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}
