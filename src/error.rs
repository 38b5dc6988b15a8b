//! HTTP-facing error type and its mapping onto the reply envelope.
//!
//! Every error reply goes through [`AppError::into_response`], whether a handler
//! returns the error directly or records it into the request bag.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::api::dto::envelope::{Envelope, FieldError};

pub const VALIDATION_MESSAGE: &str = "Validation failed";
pub const BAD_REQUEST_MESSAGE: &str = "Bad Request";
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized";
pub const FORBIDDEN_MESSAGE: &str = "Access Denied";
pub const NOT_FOUND_MESSAGE: &str = "Data not found";
pub const INTERNAL_MESSAGE: &str = "Internal Server Error";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed on {} field(s)", errors.len())]
    Validation { errors: Vec<FieldError> },

    #[error("bad request: {message}")]
    BadRequest { message: String, details: Value },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String, details: Value },

    #[error("forbidden: {message}")]
    Forbidden { message: String, details: Value },

    #[error("not found: {message}")]
    NotFound { message: String, details: Value },

    #[error("internal error: {message}")]
    Internal { message: String, details: Value },
}

impl AppError {
    pub fn validation(errors: Vec<FieldError>) -> Self {
        Self::Validation { errors }
    }
    pub fn bad_request(message: impl Into<String>, details: Value) -> Self {
        Self::BadRequest {
            message: message.into(),
            details,
        }
    }
    pub fn unauthorized(message: impl Into<String>, details: Value) -> Self {
        Self::Unauthorized {
            message: message.into(),
            details,
        }
    }
    pub fn forbidden(message: impl Into<String>, details: Value) -> Self {
        Self::Forbidden {
            message: message.into(),
            details,
        }
    }
    pub fn not_found(message: impl Into<String>, details: Value) -> Self {
        Self::NotFound {
            message: message.into(),
            details,
        }
    }
    pub fn internal(message: impl Into<String>, details: Value) -> Self {
        Self::Internal {
            message: message.into(),
            details,
        }
    }

    /// Status code this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Converts the error into the envelope sent to the client.
    ///
    /// Client messages are fixed per kind; the variant's own message and details
    /// stay server-side.
    pub fn envelope(self) -> Envelope {
        match self {
            AppError::Validation { errors } => Envelope::failure(VALIDATION_MESSAGE, errors),
            AppError::BadRequest { .. } => Envelope::failure(BAD_REQUEST_MESSAGE, vec![]),
            AppError::Unauthorized { .. } => Envelope::failure(UNAUTHORIZED_MESSAGE, vec![]),
            AppError::Forbidden { .. } => Envelope::failure(FORBIDDEN_MESSAGE, vec![]),
            AppError::NotFound { .. } => Envelope::failure(NOT_FOUND_MESSAGE, vec![]),
            AppError::Internal { .. } => Envelope::failure(INTERNAL_MESSAGE, vec![]),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::Internal { message, details } => {
                tracing::error!(%message, %details, "request failed");
            }
            AppError::Validation { errors } => {
                tracing::debug!(count = errors.len(), "request validation failed");
            }
            AppError::BadRequest { message, details }
            | AppError::Unauthorized { message, details }
            | AppError::Forbidden { message, details }
            | AppError::NotFound { message, details } => {
                tracing::debug!(status = status.as_u16(), %message, %details, "request rejected");
            }
        }

        (status, Json(self.envelope())).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        map_sqlx_error(e)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::internal(format!("{e:#}"), json!({}))
    }
}

/// Maps `sqlx` errors onto the HTTP error kinds.
///
/// `RowNotFound` is the "record not found" signal and becomes a 404;
/// everything else is internal.
pub fn map_sqlx_error(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::RowNotFound => AppError::not_found("Record not found", json!({})),
        other => {
            let details = match other.as_database_error() {
                Some(db) => json!({ "code": db.code(), "constraint": db.constraint() }),
                None => json!({}),
            };
            AppError::internal(format!("Database error: {other}"), details)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::validation(vec![]).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::bad_request("EOF", json!({})).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::unauthorized("missing", json!({})).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::forbidden("no", json!({})).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::not_found("gone", json!({})).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::internal("boom", json!({})).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let env = AppError::internal("db password is hunter2", json!({"secret": 1})).envelope();
        let body = serde_json::to_value(env).unwrap();
        assert_eq!(body, json!({"message": "Internal Server Error"}));
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.envelope().message(), "Data not found");
    }

    #[test]
    fn test_other_sqlx_errors_are_internal() {
        let err: AppError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_anyhow_is_internal() {
        let err: AppError = anyhow::anyhow!("nope").into();
        assert!(matches!(err, AppError::Internal { .. }));
    }
}
