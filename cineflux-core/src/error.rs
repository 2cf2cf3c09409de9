use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{directory} API error ({status}): {message}")]
    Api {
        directory: &'static str,
        status: u16,
        message: String,
    },

    #[error("Challenge solver error: {0}")]
    Challenge(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid media id: {0}")]
    InvalidMediaId(String),

    #[error("Repository error: {0}")]
    Repository(String),

    /// A failure observed through a shared in-flight search. All waiters on
    /// the same key see the same underlying error.
    #[error("Joined request failed: {0}")]
    Joined(Arc<SourceError>),
}

pub type Result<T> = std::result::Result<T, SourceError>;
