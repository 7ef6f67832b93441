//! Error types for the image file cache

use std::path::Path;

use thiserror::Error;

/// Errors from the network collaborator
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(Box<reqwest::Error>),
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("fetch failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http(Box::new(err))
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    /// Malformed or disallowed URL
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("IO error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Cache entry not found: {0}")]
    NotFound(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CacheError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        CacheError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn io_at(action: &str, path: &Path, source: std::io::Error) -> Self {
        Self::io(format!("{} {}", action, path.display()), source)
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
