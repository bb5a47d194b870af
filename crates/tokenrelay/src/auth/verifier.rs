//! Bearer token verification

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde::Deserialize;

use super::claims::{Claims, OneOrMany};
use super::config::VerifierConfig;
use super::error::{Result, VerifyError};
use super::jwks::{KeyResolver, ResolvedKey};
use crate::helpers::unix_now;
use crate::observability;

/// Token verifier
///
/// Checks run in a fixed order so that the reported failure is deterministic:
/// header and `kid`, key resolution, issuer, audience, expiry, signature.
/// Claim checks are repeated on the signature-verified payload and only that
/// payload is returned.
pub struct TokenVerifier {
    config: VerifierConfig,
    resolver: Arc<dyn KeyResolver>,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .field("resolver", &self.resolver)
            .finish()
    }
}

impl TokenVerifier {
    #[must_use]
    pub fn new(config: VerifierConfig, resolver: Arc<dyn KeyResolver>) -> Self {
        Self { config, resolver }
    }

    pub const fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub async fn verify(&self, token: &str) -> Result<Claims> {
        self.verify_at(token, unix_now()).await
    }

    /// Verify against an explicit wall-clock time (seconds since the epoch).
    pub async fn verify_at(&self, token: &str, now: i64) -> Result<Claims> {
        let outcome = self.run_checks(token, now).await;
        match &outcome {
            Ok(_) => observability::record_verification("ok"),
            Err(e) => {
                tracing::warn!(reason = e.kind(), "Token verification failed");
                observability::record_verification(e.kind());
            }
        }
        outcome
    }

    async fn run_checks(&self, token: &str, now: i64) -> Result<Claims> {
        let header = decode_header(token)
            .map_err(|e| VerifyError::MalformedToken(format!("invalid header: {e}")))?;
        let kid = header
            .kid
            .as_deref()
            .ok_or_else(|| VerifyError::MalformedToken("missing kid".into()))?;

        let key = self.resolver.resolve_key(kid).await?;

        let unverified = peek_claims(token)?;
        self.check_claims(
            unverified.iss.as_deref(),
            unverified.aud.as_ref(),
            unverified.exp,
            now,
        )?;

        let verified = verify_signature(token, header.alg, &key)?;
        // Re-derive every decision from the verified payload.
        self.check_claims(
            Some(&verified.iss),
            verified.aud.as_ref(),
            Some(verified.exp),
            now,
        )?;

        Ok(verified)
    }

    fn check_claims(
        &self,
        iss: Option<&str>,
        aud: Option<&OneOrMany>,
        exp: Option<i64>,
        now: i64,
    ) -> Result<()> {
        if iss != Some(self.config.issuer.as_str()) {
            return Err(VerifyError::IssuerMismatch);
        }

        if !aud.is_some_and(|aud| aud.contains(&self.config.audience)) {
            return Err(VerifyError::AudienceMismatch);
        }

        let exp = exp.ok_or_else(|| VerifyError::MalformedToken("missing exp".into()))?;
        if now > exp {
            return Err(VerifyError::Expired);
        }

        Ok(())
    }
}

/// Claims read before the signature is checked. Every field is optional so
/// that a missing claim is reported as the mismatch it causes.
#[derive(Debug, Deserialize)]
struct PeekedClaims {
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Option<OneOrMany>,
    #[serde(default)]
    exp: Option<i64>,
}

/// Decode the payload segment without checking the signature.
fn peek_claims(token: &str) -> Result<PeekedClaims> {
    let mut segments = token.split('.');
    let (Some(_), Some(payload), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(VerifyError::MalformedToken(
            "expected three dot-separated segments".into(),
        ));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| VerifyError::MalformedToken(format!("invalid payload encoding: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| VerifyError::MalformedToken(format!("invalid claims: {e}")))
}

fn verify_signature(token: &str, declared: Algorithm, key: &ResolvedKey) -> Result<Claims> {
    if declared != key.algorithm {
        return Err(VerifyError::SignatureInvalid);
    }

    // Claim checks are done by the caller; only the signature is checked here.
    let mut validation = Validation::new(key.algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(token, &key.key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                VerifyError::SignatureInvalid
            }
            _ => VerifyError::MalformedToken(e.to_string()),
        })
}
