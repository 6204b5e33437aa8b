//! API error handling.
//!
//! This module provides error types and response formatting for the API.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::application::{PatchError, TOKEN_SCHEME};
use crate::domain::JSON_PATCH_MEDIA_TYPE;
use crate::infrastructure::RepositoryError;

// =============================================================================
// API Error
// =============================================================================

/// API error structure for JSON responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional field-level errors for validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

impl ApiError {
    /// Creates an error without field details.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Creates a validation error with field-level details.
    #[must_use]
    pub fn validation(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self {
            code: "VALIDATION_ERROR".to_string(),
            message: message.into(),
            details: Some(details),
        }
    }
}

/// Field-level error for validation failures.
///
/// Serialized into the `details` array of an [`ApiError`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    /// Name of the offending request field, as sent by the client.
    pub field: String,
    /// What is wrong with the field's value.
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// API Error Response
// =============================================================================

/// API error response containing status code, error details and any extra
/// headers the status requires.
#[derive(Debug, Clone)]
pub struct ApiErrorResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// JSON body.
    pub error: ApiError,
    /// Headers sent alongside the body, such as `WWW-Authenticate`.
    pub headers: HeaderMap,
}

impl ApiErrorResponse {
    /// Creates a response with no extra headers.
    #[must_use]
    pub fn new(status: StatusCode, error: ApiError) -> Self {
        Self {
            status,
            error,
            headers: HeaderMap::new(),
        }
    }

    /// Adds a header to the response.
    #[must_use]
    pub fn with_header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Creates a 400 Bad Request response.
    #[must_use]
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ApiError::new(code, message))
    }

    /// Creates a 400 Bad Request response for validation errors.
    #[must_use]
    pub fn validation_error(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ApiError::validation(message, details),
        )
    }

    /// Creates a 401 Unauthorized response with a `WWW-Authenticate` challenge.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            ApiError::new("UNAUTHORIZED", message),
        )
        .with_header(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static(TOKEN_SCHEME),
        )
    }

    /// Creates a 403 Forbidden response.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, ApiError::new("FORBIDDEN", message))
    }

    /// Creates a 404 Not Found response.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ApiError::new("NOT_FOUND", message))
    }

    /// Creates a 409 Conflict response for a missing precondition.
    #[must_use]
    pub fn precondition_required(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::CONFLICT,
            ApiError::new("PRECONDITION_REQUIRED", message),
        )
    }

    /// Creates a 412 Precondition Failed response for a stale `If-Match`.
    #[must_use]
    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::PRECONDITION_FAILED,
            ApiError::new("PRECONDITION_FAILED", message),
        )
    }

    /// Creates a 415 response advertising the accepted patch format.
    #[must_use]
    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::new("UNSUPPORTED_MEDIA_TYPE", message),
        )
        .with_header(
            header::HeaderName::from_static("accept-patch"),
            HeaderValue::from_static(JSON_PATCH_MEDIA_TYPE),
        )
    }

    /// Creates a 500 Internal Server Error response.
    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::new("INTERNAL_ERROR", message),
        )
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, Json(self.error)).into_response()
    }
}

impl From<RepositoryError> for ApiErrorResponse {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound(message) => Self::not_found(message),
            // Internal errors are logged, never exposed to clients.
            RepositoryError::DatabaseError(_) | RepositoryError::InjectedFailure(_) => {
                tracing::error!(%error, "Internal error");
                Self::internal_error("An internal error occurred")
            }
        }
    }
}

impl From<PatchError> for ApiErrorResponse {
    fn from(error: PatchError) -> Self {
        let message = error.to_string();
        match error {
            PatchError::NotFound(_) => Self::not_found(message),
            PatchError::Forbidden(_) => Self::forbidden(message),
            PatchError::Conflict => Self::precondition_required(message),
            PatchError::PreconditionFailed(_) => Self::precondition_failed(message),
            PatchError::UnsupportedMediaType(_) => Self::unsupported_media_type(message),
            PatchError::BadRequest(_) => Self::bad_request("INVALID_PATCH", message),
            PatchError::Internal(error) => Self::from(error),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Validation error type for request bodies.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Every failed field, in the order they were checked.
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    /// Creates a validation error from collected field errors.
    #[must_use]
    pub const fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    /// Creates a validation error with a single field error.
    #[must_use]
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![FieldError::new(field, message)])
    }
}

impl From<ValidationError> for ApiErrorResponse {
    fn from(error: ValidationError) -> Self {
        Self::validation_error("Validation failed", error.errors)
    }
}

// =============================================================================
// Tests
// =============================================================================
