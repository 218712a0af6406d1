//! Custom error types for leadpipe

use thiserror::Error;

/// Main error type for leadpipe operations
///
/// Row-level defects never surface here; the reader counts and skips them.
/// Only request errors and systemic failures (storage, database) are fatal.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Blob storage error: {0}")]
    Blob(String),

    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Input has no header row: {0}")]
    EmptyInput(String),

    #[error("Unknown column '{column}' in {context}")]
    UnknownColumn { column: String, context: String },

    #[error("Invalid delimiter: {0}")]
    InvalidDelimiter(String),

    #[error("Invalid predicate for '{column}': {reason}")]
    InvalidPredicate { column: String, reason: String },

    #[error("Invalid lead identifier: {0}")]
    InvalidLeadId(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("No data available: none of the {0} source table(s) could be read")]
    NoDataAvailable(usize),

    #[error("Not initialized: run 'leadpipe init' first")]
    NotInitialized,

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for leadpipe
pub type Result<T> = std::result::Result<T, Error>;
