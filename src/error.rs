//! Error types for request handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::db::DbError;

/// Errors surfaced to HTTP callers.
///
/// Validation and permission failures carry the plain-text reason shown to
/// the user. Store and upstream failures are logged and answered with a
/// generic message.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or invalid input
    #[error("{0}")]
    BadRequest(String),

    /// The current user lacks a required permission
    #[error("{0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// The member service could not be reached or answered badly
    #[error("Member service error: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Session store error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("Report export error: {0}")]
    Export(#[from] csv::Error),
}

/// Errors that stop the server from starting or serving.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Database(_) | Self::Session(_) | Self::Export(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(DbError::Sqlite(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::BadRequest(message) | Self::Forbidden(message) => message.clone(),
            Self::Database(_) | Self::Session(_) | Self::Export(_) => {
                tracing::error!(error = %self, "Request failed");
                "Internal server error".to_string()
            }
            Self::Upstream(_) => {
                tracing::error!(error = %self, "Member service request failed");
                "Member service unavailable".to_string()
            }
        };

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::bad_request("Invalid student.").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::forbidden("Insufficient permissions.").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Database(DbError::LockPoisoned).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_validation_message_is_returned() {
        let err = AppError::bad_request("Missing first name.");
        assert_eq!(err.to_string(), "Missing first name.");

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_database_error_does_not_leak_details() {
        let response = AppError::Database(DbError::LockPoisoned).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
