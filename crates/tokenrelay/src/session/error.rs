//! Session error types

use thiserror::Error;

use super::kv::KvError;

#[derive(Error, Debug)]
pub enum SessionError {
    /// Garbled or tampered session identifier
    #[error("bad session signature")]
    BadSignature,

    /// Signature older than the allowed window (or dated in the future)
    #[error("session signature expired")]
    Expired,

    /// Valid identifier without a stored record
    #[error("session not found")]
    NotFound,

    #[error("invalid session record: {0}")]
    Serialization(String),

    #[error(transparent)]
    Store(#[from] KvError),
}

impl SessionError {
    /// Short label used for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BadSignature => "bad_signature",
            Self::Expired => "expired",
            Self::NotFound => "missing",
            Self::Serialization(_) => "invalid_record",
            Self::Store(_) => "store_error",
        }
    }

    /// `true` when the caller simply is not authenticated, as opposed to a
    /// backend failure.
    #[must_use]
    pub const fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            Self::BadSignature | Self::Expired | Self::NotFound | Self::Serialization(_)
        )
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
