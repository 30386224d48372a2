//! Error types for the board service

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use common::error::DatabaseError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::lifecycle::LifecycleError;
use crate::payment::PaymentError;

/// Error type for the board service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Mutating request without a CSRF token
    #[error("Missing CSRF token")]
    MissingCsrfToken,

    /// CSRF token that does not verify
    #[error("Invalid CSRF token")]
    InvalidCsrfToken,

    /// No session of the required kind; answered with a redirect
    #[error("Not authenticated")]
    NotAuthenticated { login: &'static str },

    #[error("Forbidden")]
    Forbidden,

    /// Absent resource, or one the caller does not own
    #[error("Not found")]
    NotFound,

    #[error("Job cannot move from {from} to {to}")]
    IneligibleTransition {
        from: crate::models::JobStatus,
        to: crate::models::JobStatus,
    },

    #[error("Invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Payment provider error: {0}")]
    PaymentProvider(#[from] PaymentError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error")]
    InternalServerError,

    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl ApiError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::IneligibleTransition { from, to } => {
                Self::IneligibleTransition { from, to }
            }
            LifecycleError::Validation { field, message } => Self::Validation { field, message },
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Duplicate { field } => Self::Validation {
                field,
                message: "is already taken".to_string(),
            },
            other => Self::Database(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::NotAuthenticated { login } = self {
            return (StatusCode::FOUND, [(header::LOCATION, login)]).into_response();
        }

        let (status, body) = match &self {
            ApiError::MissingCsrfToken | ApiError::InvalidCsrfToken | ApiError::Forbidden => {
                (StatusCode::FORBIDDEN, json!({ "error": self.to_string() }))
            }
            ApiError::NotFound => (StatusCode::NOT_FOUND, json!({ "error": "Not found" })),
            ApiError::IneligibleTransition { .. } => {
                (StatusCode::CONFLICT, json!({ "error": self.to_string() }))
            }
            ApiError::Validation { field, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": message, "field": field }),
            ),
            ApiError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "error": "Too many failed attempts, try again later" }),
            ),
            ApiError::PaymentProvider(e) => {
                error!("Payment provider failure: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    json!({ "error": "Payment provider unavailable" }),
                )
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Database(e) => {
                error!("Database failure: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Database error" }),
                )
            }
            ApiError::InternalServerError | ApiError::NotAuthenticated { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Internal server error" }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;
