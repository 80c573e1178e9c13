//! Error types for GitLab operations

use thiserror::Error;

/// Result type for GitLab operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while setting up GitLab access
///
/// Diff retrieval itself never fails with this type; it reports how it
/// stopped through [`crate::PageOutcome`].
#[derive(Error, Debug)]
pub enum Error {
    /// Authentication error
    #[error("GitLab authentication error: {0}")]
    Auth(String),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Core library error (configuration, secrets)
    #[error(transparent)]
    Core(#[from] mreview_core::Error),
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Parse(err.to_string())
    }
}
