//! Verification error types

use thiserror::Error;

/// Why a bearer token was rejected.
///
/// Every failure except [`VerifyError::IdentityProviderUnavailable`] is final:
/// retrying the same token cannot succeed.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("unknown key: {0}")]
    UnknownKey(String),

    #[error("issuer mismatch")]
    IssuerMismatch,

    #[error("audience mismatch")]
    AudienceMismatch,

    #[error("token expired")]
    Expired,

    #[error("invalid signature")]
    SignatureInvalid,

    #[error("identity provider unavailable: {0}")]
    IdentityProviderUnavailable(String),
}

impl VerifyError {
    /// Short label used for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MalformedToken(_) => "malformed_token",
            Self::UnknownKey(_) => "unknown_key",
            Self::IssuerMismatch => "issuer_mismatch",
            Self::AudienceMismatch => "audience_mismatch",
            Self::Expired => "expired",
            Self::SignatureInvalid => "signature_invalid",
            Self::IdentityProviderUnavailable(_) => "idp_unavailable",
        }
    }

    /// `true` when the key set could not be fetched; the next request retries.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::IdentityProviderUnavailable(_))
    }
}

impl From<reqwest::Error> for VerifyError {
    fn from(err: reqwest::Error) -> Self {
        Self::IdentityProviderUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VerifyError>;
