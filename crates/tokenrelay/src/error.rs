use thiserror::Error;

/// Process-level errors (startup, configuration, transport)
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Identity provider error: {0}")]
    Idp(#[from] crate::idp::IdpError),

    #[error("Session error: {0}")]
    Session(#[from] crate::session::SessionError),
}

impl Error {
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
