use std::io;

use lingo_core::Collection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] lingo_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No {collection} item with id {id}")]
    ItemNotFound { collection: Collection, id: String },
    #[error("Item ID cannot be empty")]
    EmptyItemId,
    #[error("Page size must be at least 1")]
    InvalidPageSize,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "No remote is configured. Pass --remote-url (or set LINGO_REMOTE_URL), or --remote-file for a JSON dump."
    )]
    RemoteNotConfigured,
}
