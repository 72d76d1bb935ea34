//! Uniform success/error envelope shared by every endpoint.
//!
//! Success replies always carry `data`; failure replies carry `message`
//! plus `error` detail and never `data`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::validate::FieldError;

pub fn ok(data: Value) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

#[derive(Debug)]
pub enum ApiError {
    /// Client input violated declared constraints; the full violation
    /// set is always reported.
    Validation(Vec<FieldError>),
    /// Resource-oriented lookup failed on the backend.
    NotFound { message: String, detail: String },
    /// Collection or action command failed on the backend.
    Backend { message: String, detail: String },
    /// Client exceeded its request window.
    RateLimited,
    /// Unexpected handler failure; detail forwarded only when `expose`.
    Internal { detail: String, expose: bool },
}

impl From<Vec<FieldError>> for ApiError {
    fn from(errors: Vec<FieldError>) -> Self {
        ApiError::Validation(errors)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "message": "Validation failed",
                    "errors": errors,
                })),
            )
                .into_response(),
            ApiError::NotFound { message, detail } => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "success": false,
                    "message": message,
                    "error": detail,
                })),
            )
                .into_response(),
            ApiError::Backend { message, detail } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": message,
                    "error": detail,
                })),
            )
                .into_response(),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "success": false,
                    "message": "Too many requests, please try again later",
                    "error": "rate limit exceeded",
                })),
            )
                .into_response(),
            ApiError::Internal { detail, expose } => {
                tracing::error!(error = %detail, "internal gateway error");
                let forwarded = if expose {
                    detail
                } else {
                    "internal server error".to_string()
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "success": false,
                        "message": "Internal server error",
                        "error": forwarded,
                    })),
                )
                    .into_response()
            }
        }
    }
}
