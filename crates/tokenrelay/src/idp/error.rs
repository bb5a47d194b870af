//! Identity provider emulator errors

use thiserror::Error;

use crate::auth::VerifyError;

#[derive(Debug, Error)]
pub enum IdpError {
    /// Unknown subject and wrong password are reported identically.
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Token not found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    #[error("invalid_client")]
    InvalidClient,

    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("key error: {0}")]
    Key(String),
}

impl IdpError {
    /// OAuth 2.0 error code for token-endpoint style responses.
    #[must_use]
    pub const fn oauth_code(&self) -> Option<&'static str> {
        match self {
            Self::InvalidRequest(_) => Some("invalid_request"),
            Self::InvalidClient => Some("invalid_client"),
            Self::InvalidGrant(_) | Self::InvalidCredentials => Some("invalid_grant"),
            Self::UnsupportedGrantType(_) => Some("unsupported_grant_type"),
            _ => None,
        }
    }
}

impl From<VerifyError> for IdpError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Expired => Self::Unauthorized("Token has expired".into()),
            other => Self::Unauthorized(format!("Invalid token: {other}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, IdpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_credentials_message_is_uniform() {
        assert_eq!(
            IdpError::InvalidCredentials.to_string(),
            "Invalid username or password"
        );
    }

    #[test]
    fn test_verify_error_conversion() {
        let err: IdpError = VerifyError::Expired.into();
        assert_eq!(err.to_string(), "Token has expired");

        let err: IdpError = VerifyError::SignatureInvalid.into();
        assert_eq!(err.to_string(), "Invalid token: invalid signature");
    }

    #[test]
    fn test_oauth_codes() {
        assert_eq!(IdpError::InvalidClient.oauth_code(), Some("invalid_client"));
        assert_eq!(
            IdpError::UnsupportedGrantType("password".into()).oauth_code(),
            Some("unsupported_grant_type")
        );
        assert_eq!(IdpError::NotFound.oauth_code(), None);
    }
}
