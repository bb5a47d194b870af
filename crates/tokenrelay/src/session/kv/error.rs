//! Key-value backend errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("Key-value store connection error: {0}")]
    Connection(String),

    #[error("Key-value store error: {0}")]
    Backend(String),

    #[error("Unsupported key-value store URL: {0}")]
    UnsupportedUrl(String),
}

impl From<redis::RedisError> for KvError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_refusal() || err.is_timeout() {
            Self::Connection(err.to_string())
        } else {
            Self::Backend(err.to_string())
        }
    }
}

pub type KvResult<T> = Result<T, KvError>;
