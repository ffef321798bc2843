//! Error types for memo-core

use thiserror::Error;

/// Result type alias using memo-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in memo-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local persistence failed (disk full, unwritable directory, ...)
    #[error("Local store error: {0}")]
    LocalStore(String),

    /// Remote read/write/subscribe failed (network, auth, permission)
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Import payload was rejected as a whole
    #[error("Invalid import: {0}")]
    InvalidImport(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
