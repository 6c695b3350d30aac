// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Errors returned by request handlers.
///
/// Each variant maps to one HTTP status. The sanitizer never produces one:
/// bad HTML is cleaned, not rejected.
#[derive(Debug)]
pub enum AppError {
    // 500: details are logged, never sent
    InternalServerError(String),

    // 400: validation failures, bad schedules, empty comments
    BadRequest(String),

    // 401: missing or invalid credentials
    AuthError(String),

    // 403: authenticated, but not the author or an admin
    Forbidden(String),

    // 404: unknown or not publicly visible
    NotFound(String),

    // 409: duplicate username or tag
    Conflict(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::InternalServerError(msg)
            | AppError::BadRequest(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status().as_u16(), self.message())
    }
}

impl std::error::Error for AppError {}

/// Renders `{"error": msg}` with the variant's status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            other => {
                tracing::debug!("Request rejected: {}", other);
                other.message().to_string()
            }
        };

        (status, Json(json!({ "error": error_message }))).into_response()
    }
}

/// Database failures are internal unless a handler maps them first.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// Hashing failures (bad stored hash, RNG failure) are server-side.
impl From<argon2::password_hash::Error> for AppError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

/// Token decoding failures: expired, tampered or signed with another key.
impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::AuthError(format!("Invalid token: {}", err))
    }
}

/// A blocking task (the sanitizer) panicked or was cancelled.
impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::InternalServerError(format!("Blocking task failed: {}", err))
    }
}

/// True when a database error is a UNIQUE constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}
