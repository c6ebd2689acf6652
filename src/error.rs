//! Error types for the jobttl webhook

use thiserror::Error;

/// Main error type for jobttl operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Label selector expression failed to parse
    #[error("invalid label selector: {0}")]
    Selector(#[from] crate::selector::ParseError),

    /// Invalid static configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
