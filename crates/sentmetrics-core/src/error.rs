//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The message source failed.
    #[error("Message source error: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A stored value could not be decoded.
    #[error("Corrupt {column} value: {value:?}")]
    Corrupt {
        /// Column name.
        column: &'static str,
        /// Stored value.
        value: String,
    },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
