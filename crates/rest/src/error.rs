//! Error mapping from the storage engine to HTTP.
//!
//! | Store error | HTTP status | FHIR issue code |
//! |-------------|-------------|-----------------|
//! | NotFound | 404 | not-found |
//! | Conflict | 409 | duplicate |
//! | InvalidInput | 400 | invalid |
//! | UnsupportedParameter | 400 | not-supported |
//! | Format | 400 | value |
//! | InvalidReference | 422 | processing |
//! | Internal | 500 | exception |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use vireo_persistence::StoreError;

use crate::responses::{fhir_json, operation_outcome};

/// The error type surfaced by every handler.
#[derive(Debug)]
pub enum RestError {
    /// Resource or version absent (404).
    NotFound { message: String },
    /// Primary-key collision on create (409).
    Conflict { message: String },
    /// Malformed request content (400).
    BadRequest { message: String },
    /// A search control parameter outside the whitelist (400).
    NotSupported { message: String },
    /// A value that cannot be coerced to its column type (400).
    UnprocessableValue { message: String },
    /// A reference with no live target (422).
    UnprocessableEntity { message: String },
    /// Anything unexpected (500).
    Internal { message: String },
}

impl RestError {
    /// HTTP status, FHIR issue code, and diagnostics for this error.
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            RestError::NotFound { message } => (StatusCode::NOT_FOUND, "not-found", message),
            RestError::Conflict { message } => (StatusCode::CONFLICT, "duplicate", message),
            RestError::BadRequest { message } => (StatusCode::BAD_REQUEST, "invalid", message),
            RestError::NotSupported { message } => {
                (StatusCode::BAD_REQUEST, "not-supported", message)
            }
            RestError::UnprocessableValue { message } => {
                (StatusCode::BAD_REQUEST, "value", message)
            }
            RestError::UnprocessableEntity { message } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "processing", message)
            }
            RestError::Internal { message } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "exception", message)
            }
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        RestError::BadRequest {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (_, code, message) = self.parts();
        write!(f, "{code}: {message}")
    }
}

impl From<StoreError> for RestError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::NotFound { .. } => RestError::NotFound {
                message: err.to_string(),
            },
            StoreError::Conflict { .. } => RestError::Conflict {
                message: err.to_string(),
            },
            StoreError::InvalidInput { .. } => RestError::BadRequest {
                message: err.to_string(),
            },
            StoreError::UnsupportedParameter { .. } => RestError::NotSupported {
                message: err.to_string(),
            },
            StoreError::Format { .. } => RestError::UnprocessableValue {
                message: err.to_string(),
            },
            StoreError::InvalidReference { .. } => RestError::UnprocessableEntity {
                message: err.to_string(),
            },
            StoreError::Internal { .. } => {
                tracing::error!(error = %err, "internal storage error");
                RestError::Internal {
                    message: "internal server error".to_string(),
                }
            }
        }
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let severity = if status.is_server_error() {
            "fatal"
        } else {
            "error"
        };
        fhir_json(status, &operation_outcome(severity, code, message))
    }
}

/// Result type alias for handlers.
pub type RestResult<T> = Result<T, RestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_the_documented_statuses() {
        let cases = [
            (
                StoreError::not_found("Patient", "x"),
                StatusCode::NOT_FOUND,
            ),
            (
                StoreError::Conflict {
                    resource_type: "Patient".into(),
                    id: "x".into(),
                },
                StatusCode::CONFLICT,
            ),
            (StoreError::invalid("nope"), StatusCode::BAD_REQUEST),
            (
                StoreError::UnsupportedParameter {
                    parameter: "_sort".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (StoreError::format("bad"), StatusCode::BAD_REQUEST),
            (
                StoreError::InvalidReference {
                    reference: "Patient/ghost".into(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (StoreError::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (store_err, expected) in cases {
            let rest_err: RestError = store_err.into();
            let (status, _, _) = rest_err.parts();
            assert_eq!(status, expected);
        }
    }
}
