use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use light_infra::JobError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Job(#[from] JobError),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Job(err) => match err {
                JobError::NotReady(_) => (StatusCode::SERVICE_UNAVAILABLE, "not_ready"),
                JobError::Concurrency(_) | JobError::RetryExhausted { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "conflict")
                }
                JobError::JobNotFound(_) | JobError::PromiseNotFound(_) => {
                    (StatusCode::NOT_FOUND, "not_found")
                }
                JobError::InvariantViolation(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "job_error"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(error = %self, "request failed");
        }
        json_error(status, code, self.to_string())
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
