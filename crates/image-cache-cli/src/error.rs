//! Error types for the image cache CLI

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Cache(#[from] image_file_cache::CacheError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Logging setup error: {0}")]
    Logging(String),
    #[error("{failed} of {total} URLs could not be resolved")]
    ResolveFailed { failed: usize, total: usize },
}

impl From<tracing_subscriber::filter::ParseError> for CliError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        CliError::Logging(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
