//! JSON error responses.

use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use convertino_core::{ConversionError, ErrorKind};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

/// Errors returned by API handlers.
#[derive(Debug)]
pub enum ApiError {
    /// Anything from the conversion engine.
    Conversion(ConversionError),
    /// The request itself is malformed: not multipart, missing fields.
    BadRequest(String),
}

impl ApiError {
    /// Map a multipart failure. Hitting the body limit is a size violation.
    pub fn from_multipart(err: MultipartError, limit_bytes: u64) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::Conversion(ConversionError::PayloadTooLarge {
                filename: "request".to_string(),
                limit_bytes,
            })
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}

impl From<ConversionError> for ApiError {
    fn from(err: ConversionError) -> Self {
        ApiError::Conversion(err)
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::ConversionFailed => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Conversion(err) => {
                if err.kind() == ErrorKind::InternalError {
                    tracing::error!("Internal error: {}", err);
                }
                (
                    status_for(err.kind()),
                    ErrorResponse {
                        error: err.user_message(),
                        kind: err.kind().as_str().to_string(),
                    },
                )
            }
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: message,
                    kind: "bad_request".to_string(),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}
