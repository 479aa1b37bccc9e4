//! JSON response envelope for the admin API.
//!
//! Success: `{"success": true, "data": ..., "message": ...}` (data and
//! message each optional). Failure: `{"success": false, "error": "..."}`.

use crate::error::{Error, ToHttpStatus};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

/// Success envelope with a data payload
pub fn success<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(json!({"success": true, "data": data}))).into_response()
}

/// Success envelope with only a human message
pub fn success_message(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"success": true, "message": message}))).into_response()
}

/// Failure envelope with an explicit status
pub fn failure(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(json!({"success": false, "error": error.into()})),
    )
        .into_response()
}

/// Failure envelope derived from a domain error
pub fn error_response(error: &Error) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    // Store internals stay out of client-visible messages
    let message = match error {
        Error::Database(_) | Error::Sqlx(_) | Error::Io(_) => "internal server error".to_string(),
        other => other.to_string(),
    };
    failure(status, message)
}
