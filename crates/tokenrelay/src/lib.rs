//! Token verification, server-side sessions and a mock identity provider
//!
//! The crate backs four HTTP services that together propagate a bearer token
//! from a browser session down a chain of services:
//!
//! - `edge` - authorization-code login, signed session cookies, forwarding
//! - `orchestrator` - runs a task on behalf of the user
//! - `resource` - verifies the bearer token against the published key set
//! - `idp` - identity provider emulator used in tests and local setups

pub mod auth;
pub mod config;
mod constants;
mod error;
mod helpers;
pub mod idp;
pub mod observability;
pub mod services;
pub mod session;

pub use auth::{Claims, JwksCache, KeyResolver, TokenVerifier, VerifierConfig, VerifyError};
pub use config::{ServiceKind, Settings};
pub use constants::*;
pub use error::{Error, Result};
pub use idp::{IdentityProvider, IdpConfig, IdpError, SigningKey};
pub use session::{SessionError, SessionManager, SessionRecord, SessionSigner, SessionStore};
