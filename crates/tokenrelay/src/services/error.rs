//! HTTP error responses

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::auth::VerifyError;
use crate::idp::IdpError;
use crate::session::SessionError;

/// Error surfaced by a handler, rendered as `{"detail": "..."}`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<VerifyError> for ServiceError {
    fn from(err: VerifyError) -> Self {
        if err.is_unavailable() {
            Self::Upstream(err.to_string())
        } else {
            Self::Authentication(format!("Invalid token: {err}"))
        }
    }
}

impl From<IdpError> for ServiceError {
    fn from(err: IdpError) -> Self {
        match err {
            IdpError::InvalidCredentials | IdpError::Unauthorized(_) | IdpError::InvalidClient => {
                Self::Authentication(err.to_string())
            }
            IdpError::NotFound => Self::NotFound(err.to_string()),
            IdpError::BadRequest(_)
            | IdpError::InvalidRequest(_)
            | IdpError::InvalidGrant(_)
            | IdpError::UnsupportedGrantType(_) => Self::Validation(err.to_string()),
            IdpError::Signing(_) | IdpError::Key(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<SessionError> for ServiceError {
    fn from(err: SessionError) -> Self {
        if err.is_unauthenticated() {
            Self::Authentication(format!("Not authenticated: {err}"))
        } else {
            Self::Upstream(err.to_string())
        }
    }
}
