use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read trust data {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid trust data json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid trust data: {0}")]
    InvalidData(String),
}

pub type PolicyResult<T> = Result<T, PolicyError>;
