use std::path::PathBuf;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("dataset not found: {}", .0.display())]
    DatasetNotFound(PathBuf),

    #[error("malformed dataset: {0}")]
    DatasetFormat(String),

    #[error("adapter artifact not found: {}", .0.display())]
    AdapterNotFound(PathBuf),

    #[error("adapter was trained on base model `{found}`, but `{expected}` is configured")]
    ProvenanceMismatch { expected: String, found: String },

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
