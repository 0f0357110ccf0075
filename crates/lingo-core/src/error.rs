//! Error types for lingo-core

use thiserror::Error;

/// Result type alias using lingo-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in lingo-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Item not found
    #[error("Item not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A full sync was requested while the device is offline
    #[error("Device is offline; full sync requires connectivity")]
    Offline,

    /// The remote source cannot serve the requested ordering (e.g. missing index)
    #[error("Remote query unsupported: {0}")]
    QueryUnsupported(String),

    /// Remote source failure
    #[error("Remote error: {0}")]
    Remote(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Whether this error is the recoverable "ordered query unsupported" condition.
    pub const fn is_query_unsupported(&self) -> bool {
        matches!(self, Self::QueryUnsupported(_))
    }
}
