use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use quarry_jobs::JobError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to bind {0}: {1}")]
    Bind(String, std::io::Error),

    #[error("server error: {0}")]
    Server(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Job(#[from] JobError),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::NotFound(msg) | Self::Job(JobError::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, msg.clone())
            }
            Self::BadRequest(msg) | Self::Job(JobError::InvalidState(msg)) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            other => {
                tracing::error!("gateway internal error: {other}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_owned(),
                )
            }
        };
        (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
    }
}
