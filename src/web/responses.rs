//! HTTP response mapping
//!
//! Converts engine results into consistent JSON responses: 400 for
//! validation failures (with the offending field when known), 404 for
//! missing resources, 409 when the engine is busy, 502 for upstream
//! failures, 500 for engine faults.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::errors::{AppError, AppResult, UpstreamError};

/// Error body returned on every non-2xx response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Convert an engine result into a response
pub fn handle_result<T: Serialize>(result: AppResult<T>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(data)).into_response(),
        Err(error) => handle_error(error),
    }
}

/// Convert an engine error into a response
pub fn handle_error(error: AppError) -> Response {
    let (status, field) = match &error {
        AppError::Validation { field, .. } => (StatusCode::BAD_REQUEST, field.clone()),
        AppError::NotFound { .. } => (StatusCode::NOT_FOUND, None),
        AppError::Conflict { .. } => (StatusCode::CONFLICT, None),
        AppError::Upstream(upstream) => {
            let status = match upstream {
                UpstreamError::NotFound { .. } => StatusCode::NOT_FOUND,
                UpstreamError::Conflict { .. } => StatusCode::CONFLICT,
                _ => StatusCode::BAD_GATEWAY,
            };
            (status, None)
        }
        AppError::Store(_) | AppError::Probe(_) | AppError::Internal { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, None)
        }
    };

    let body = ErrorBody {
        error: error.to_string(),
        field,
    };
    (status, Json(body)).into_response()
}
