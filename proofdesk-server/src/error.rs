//! Mapping of workflow errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use proofdesk_core::ReviewError;
use serde::Serialize;

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub held_by: Option<String>,
}

/// A `ReviewError` on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub ReviewError);

impl From<ReviewError> for ApiError {
    fn from(e: ReviewError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ReviewError::NotFound { .. } => StatusCode::NOT_FOUND,
            ReviewError::Conflict { .. } => StatusCode::CONFLICT,
            ReviewError::Validation(_) => StatusCode::BAD_REQUEST,
            ReviewError::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ReviewError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ReviewError::Storage(_) | ReviewError::Encoding(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed with {}: {}", status, self.0);
        }

        let held_by = match &self.0 {
            ReviewError::Conflict { held_by } => Some(held_by.clone()),
            _ => None,
        };
        let body = ErrorBody {
            error: self.0.kind(),
            message: self.0.to_string(),
            held_by,
        };
        (status, Json(body)).into_response()
    }
}
