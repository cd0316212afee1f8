//! Error types for the content server

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Write conflict: {0}")]
    WriteConflict(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("View error: {0}")]
    View(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// HTTP status used both for top-level responses and for batch result records.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Error::DuplicateId(_) | Error::WriteConflict(_) => StatusCode::CONFLICT,
            Error::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            Error::Configuration(_)
            | Error::View(_)
            | Error::Database(_)
            | Error::Internal(_)
            | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "notFound",
            Error::Unauthorized(_) => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            Error::InvalidRequest(_) => "invalidRequest",
            Error::MethodNotAllowed(_) => "methodNotAllowed",
            Error::DuplicateId(_) => "conflictId",
            Error::WriteConflict(_) => "writeConflict",
            Error::PreconditionFailed(_) => "preconditionFailed",
            Error::Configuration(_) => "configurationError",
            Error::View(_) | Error::Database(_) | Error::Internal(_) | Error::Other(_) => {
                "unknownError"
            }
        }
    }

    /// Transient optimistic-concurrency failure; the only error class that is retried.
    pub fn is_write_conflict(&self) -> bool {
        match self {
            Error::WriteConflict(_) => true,
            Error::Database(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        }
    }

    /// Structured error description shared by HTTP responses and batch result records.
    ///
    /// Server-side failures keep their details in the log and only expose a generic message.
    pub fn to_body(&self, error_type: &str) -> JsonValue {
        let message = if self.status().is_server_error() {
            "Error on execution of view".to_string()
        } else {
            self.to_string()
        };

        json!({
            "error": {
                "type": error_type,
                "message": message,
            },
            "reason": self.reason(),
        })
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Internal error: {}", self);
        }

        let error_type = if status.is_server_error() {
            "ServerError"
        } else {
            "ClientError"
        };

        let mut response = (status, Json(self.to_body(error_type))).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );

        if matches!(self, Error::Unauthorized(_)) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        response
    }
}

/// Map driver errors that carry a conflict meaning onto the matching variant.
pub(crate) fn classify_database_error(err: sqlx::Error, subject: &str) -> Error {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some("23505") => return Error::DuplicateId(subject.to_string()),
            Some("40001") | Some("40P01") => {
                return Error::WriteConflict(format!("{subject}: {}", db.message()))
            }
            _ => {}
        }
    }
    Error::Database(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::DuplicateId("x".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::WriteConflict("x".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::Configuration("no container".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::PreconditionFailed("x".into()).status(),
            StatusCode::PRECONDITION_FAILED
        );
    }

    #[test]
    fn test_only_write_conflict_is_retryable() {
        assert!(Error::WriteConflict("x".into()).is_write_conflict());
        assert!(!Error::DuplicateId("x".into()).is_write_conflict());
        assert!(!Error::View("boom".into()).is_write_conflict());
    }

    #[test]
    fn test_body_hides_server_details() {
        let body = Error::Internal("secret detail".into()).to_body("ViewError");
        assert_eq!(body["error"]["type"], "ViewError");
        assert_eq!(body["error"]["message"], "Error on execution of view");
        assert_eq!(body["reason"], "unknownError");

        let body = Error::DuplicateId("item".into()).to_body("ViewError");
        assert_eq!(body["error"]["message"], "Duplicate id: item");
        assert_eq!(body["reason"], "conflictId");
    }
}
