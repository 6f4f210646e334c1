//! Mapping of core errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use famledger_core::errors::{DatabaseError, Error as CoreError};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Core(err) => {
                let status = match err {
                    CoreError::NotFound(_)
                    | CoreError::Database(DatabaseError::NotFound(_))
                    | CoreError::Remote {
                        status_code: 404, ..
                    } => StatusCode::NOT_FOUND,
                    CoreError::Validation(_) | CoreError::Config(_) => StatusCode::BAD_REQUEST,
                    CoreError::Scheduler(_) => StatusCode::CONFLICT,
                    CoreError::Auth(_) | CoreError::Remote { .. } | CoreError::Network(_) => {
                        StatusCode::BAD_GATEWAY
                    }
                    CoreError::Mapping(_) | CoreError::Database(_) | CoreError::Unexpected(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, err.kind())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        let body = ErrorBody {
            code: code.to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
