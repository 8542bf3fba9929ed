//! Common error types for tagboard

use thiserror::Error;

/// Common result type for tagboard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the tagboard services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage resolver failure (unresolvable key, missing signing config)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Vision tagger failure (timeout, transport, malformed response)
    #[error("Tagger error: {0}")]
    Tagger(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
