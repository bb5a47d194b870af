//! Identity provider emulator
//!
//! Stands in for a real OIDC provider in tests and local setups. It signs
//! RS256 tokens with a key it publishes at `/.well-known/jwks.json`, so the
//! same [`crate::auth::TokenVerifier`] used by downstream services accepts
//! them.
//!
//! # Token lifecycle
//!
//! Every issued access token is recorded in a [`TokenRegistry`] as
//! [`TokenState::Active`]. Revocation moves it to [`TokenState::Revoked`]
//! and never back; introspection reports unknown, revoked and expired tokens
//! identically.
//!
//! # Role assumption
//!
//! [`IdentityProvider::assume_role`] verifies an identity token and mints a
//! synthetic credential bundle whose session token carries the `custom:*`
//! attributes as session tags.

mod config;
mod error;
mod keys;
mod oauth;
mod provider;
mod registry;
mod sts;
mod users;

pub use config::IdpConfig;
pub use error::{IdpError, Result};
#[cfg(test)]
pub(crate) use keys::test_signing_key;
pub use keys::SigningKey;
pub use oauth::{
    AuthorizeForm, AuthorizeParams, DiscoveryDocument, OAuthErrorBody, TokenBundle, TokenRequest,
    UserInfo,
};
pub use provider::{GRANTED_SCOPE, IdentityProvider};
pub use registry::{
    Introspection, RegistrySweepTask, RevokeOutcome, TokenRecord, TokenRegistry, TokenState,
};
pub use sts::{
    AssumeRoleRequest, AssumeRoleResponse, AssumedRoleUser, SESSION_TAG_CLAIMS, SessionTag,
    SessionTokenClaims, TemporaryCredentials,
};
pub use users::{MockUser, UserDirectory, UserListing};
