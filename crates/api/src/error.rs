//! Mapping of domain errors onto HTTP responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use charter_domain::shared_kernel::DomainError;
use serde::Serialize;

/// JSON error body with a stable machine-readable code.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        let status = match &error {
            DomainError::Conflict { .. } | DomainError::StaleCommitment { .. } => {
                StatusCode::CONFLICT
            }
            DomainError::JobNotFound { .. } => StatusCode::NOT_FOUND,
            DomainError::InvalidPayload { .. } => StatusCode::BAD_REQUEST,
            DomainError::TransientConflict { .. } | DomainError::InfrastructureError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            body: ErrorBody {
                error: error.code(),
                message: error.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
