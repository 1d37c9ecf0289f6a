use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfuError {
    #[error("Missing model asset: {}", path.display())]
    MissingAsset { path: PathBuf },

    #[error("Invalid safetensors file {}: {reason}", path.display())]
    InvalidSafetensors { path: PathBuf, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Pipeline worker returned {status}: {message}")]
    Worker { status: u16, message: String },
}
