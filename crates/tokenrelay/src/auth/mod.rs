//! Bearer token verification
//!
//! Tokens are verified against the identity provider's published key set:
//!
//! - [`JwksCache`] fetches and caches the key set (5 minute lifetime by default)
//! - [`KeyResolver`] selects a verification key by `kid`
//! - [`TokenVerifier`] checks issuer, audience, expiry and signature
//!
//! Claims handed to callers always come from the signature-verified payload.

mod claims;
mod config;
mod error;
mod jwks;
mod verifier;

pub use claims::{Claims, OneOrMany};
pub use config::VerifierConfig;
pub use error::{Result, VerifyError};
pub use jwks::{JwkSet, Jwk, JwksCache, JwksRefreshTask, KeyResolver, KeySet, ResolvedKey};
pub use verifier::TokenVerifier;
