//! Error types for session store operations.

use thiserror::Error;

/// Result type for session store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Session store errors.
///
/// A missing session is not an error for the CRUD operations; they report it
/// through `None`, `false` or `0`. [`StoreError::NotFound`] is raised only by
/// helpers that assume the record exists.
#[derive(Debug, Error)]
pub enum StoreError {
    /// CouchDB-specific error
    #[cfg(feature = "couchdb")]
    #[error("CouchDB error: {0}")]
    CouchDb(String),

    /// HTTP request error (CouchDB)
    #[cfg(feature = "couchdb")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Record expected to exist is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Record failed validation
    #[error("Invalid session record: {0}")]
    Validation(String),

    /// No component function with this name
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Query invoked as mutation or the reverse
    #[error("Function {name} is a {actual}, not a {expected}")]
    WrongFunctionKind {
        /// Function name
        name: String,
        /// Kind the caller asked for
        expected: &'static str,
        /// Kind the function is registered as
        actual: &'static str,
    },

    /// Arguments did not match the function's argument shape
    #[error("Invalid arguments for {function}: {message}")]
    InvalidArguments {
        /// Function name
        function: String,
        /// Parser message
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}
