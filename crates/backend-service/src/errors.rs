//! Backend error types.
//!
//! Every error maps to an HTTP status and a flat `{"error": "..."}` body via
//! `IntoResponse`. Database details are logged server-side only.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Backend error type.
///
/// Maps to HTTP status codes:
/// - Unauthenticated: 401 Unauthorized
/// - MalformedClaims: 500 Internal Server Error
/// - MissingRole: 403 Forbidden
/// - Database, Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum BackendError {
    /// No usable bearer token reached a protected route.
    #[error("Missing bearer token")]
    Unauthenticated,

    /// Forwarded claims do not have the expected shape.
    #[error("Malformed token claims: {0}")]
    MalformedClaims(String),

    /// Caller lacks the role the endpoint requires.
    #[error("Missing role: {0}")]
    MissingRole(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error")]
    Internal,
}

impl BackendError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            BackendError::Unauthenticated => 401,
            BackendError::MissingRole(_) => 403,
            BackendError::MalformedClaims(_) | BackendError::Database(_) | BackendError::Internal => {
                500
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = match &self {
            BackendError::Database(err) => {
                tracing::error!(target: "backend.database", error = %err, "Database operation failed");
                "Database error".to_string()
            }
            BackendError::MalformedClaims(reason) => {
                tracing::warn!(target: "backend.middleware.auth", reason = %reason, "Malformed forwarded claims");
                self.to_string()
            }
            _ => self.to_string(),
        };

        let mut response = (status, Json(ErrorResponse { error: message })).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer realm=\"backend\"".parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        BackendError::Database(err.to_string())
    }
}
