//! Error types for mreview

use thiserror::Error;

/// Result type alias for mreview operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for mreview operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// System prompt template error
    #[error("Template error: {0}")]
    Template(String),

    /// Tokenizer could not be loaded for the configured model
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Chat completion call failed
    #[error("Chat completion error: {0}")]
    Chat(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
