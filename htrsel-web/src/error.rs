//! Error types for htrsel-web
//!
//! Handlers return `Result<_, ApiError>`; errors render as a small HTML page
//! with the matching status code.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::html::escape;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Not logged in (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// htrsel-common error
    #[error("{0}")]
    Common(#[from] htrsel_common::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Common(htrsel_common::Error::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Common(htrsel_common::Error::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>{code}</title></head>
<body style="font-family: system-ui, sans-serif; margin: 40px;">
<h1>{code}</h1>
<p>{message}</p>
<p><a href="/admin">Back to administration</a></p>
</body>
</html>"#,
            code = status,
            message = escape(&self.to_string()),
        );

        (status, Html(body)).into_response()
    }
}

/// Shorthand for a 404 on a missing row
pub fn not_found(what: &str, id: i64) -> ApiError {
    ApiError::NotFound(format!("{} {} does not exist", what, id))
}
