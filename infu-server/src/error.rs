use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use infu_core::{InfuError, Presentation};
use thiserror::Error;
use tracing::error;

/// Request failures. Every variant renders as a [`Presentation`] carrying a
/// notification, so the page treats them like a failed generation.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Invalid(#[from] InfuError),

    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error("Example {0} does not exist")]
    UnknownExample(usize),

    #[error("{0:#}")]
    Pipeline(anyhow::Error),

    #[error("{0:#}")]
    Internal(anyhow::Error),

    #[error("Generation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Invalid(_) | ApiError::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::UnknownExample(_) => StatusCode::NOT_FOUND,
            ApiError::Pipeline(_) | ApiError::Internal(_) | ApiError::Join(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {self}");
        }
        (status, Json(Presentation::error(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Invalid(InfuError::InvalidImage("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::UnknownExample(3).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Pipeline(anyhow::anyhow!("missing weights")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
