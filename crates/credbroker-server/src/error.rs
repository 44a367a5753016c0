//! HTTP error types for the `credbroker` server.
//!
//! Maps domain errors from `credbroker-core` into broker API responses. Every
//! error variant produces a JSON body with a machine-readable `error` field
//! and a human-readable `description`.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use credbroker_core::error::{BindingError, InstanceError, UserError};

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Missing or rejected credentials.
    Unauthorized(String),
    /// Requested resource not found.
    NotFound(String),
    /// Deprovision or unbind of something that does not exist.
    Gone(String),
    /// Client sent invalid input.
    BadRequest(String),
    /// The request collides with an existing resource.
    Conflict(String),
    /// The request did not declare a broker API version.
    PreconditionFailed(String),
    /// Internal server error.
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    description: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, description) = match self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "Unauthorized", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "NotFound", msg),
            Self::Gone(msg) => (StatusCode::GONE, "Gone", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BadRequest", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", msg),
            Self::PreconditionFailed(msg) => {
                (StatusCode::PRECONDITION_FAILED, "PreconditionFailed", msg)
            }
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg),
        };

        let body = ErrorBody {
            error: error_type,
            description,
        };

        let mut response = (status, axum::Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"credbroker\""),
            );
        }
        response
    }
}

impl From<InstanceError> for AppError {
    fn from(err: InstanceError) -> Self {
        match err {
            InstanceError::NotFound { .. } => Self::NotFound(err.to_string()),
            InstanceError::Store(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<BindingError> for AppError {
    fn from(err: BindingError) -> Self {
        match err {
            BindingError::NotFound { .. } => Self::NotFound(err.to_string()),
            BindingError::User(UserError::Reserved { .. }) => Self::Conflict(err.to_string()),
            BindingError::User(_) | BindingError::Vault(_) | BindingError::Store(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<UserError> for AppError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::Reserved { .. } => Self::Conflict(err.to_string()),
            UserError::Hashing { .. } | UserError::InvalidConfig { .. } | UserError::Store(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl AppError {
    /// Turn a `NotFound` into `Gone`, as the broker API expects from deletes.
    #[must_use]
    pub fn gone_if_not_found(self) -> Self {
        match self {
            Self::NotFound(msg) => Self::Gone(msg),
            other => other,
        }
    }
}
