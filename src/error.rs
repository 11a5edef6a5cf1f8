// PlantScope Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlantScopeError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Empty or missing scientific name. Rejected before any write.
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// Remote state is unknown. Never read this as "remote is empty".
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Remote write failed: {0}")]
    RemoteWriteFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for PlantScopeError {
    fn from(err: anyhow::Error) -> Self {
        PlantScopeError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlantScopeError>;
