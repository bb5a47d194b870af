//! RSA signing key and its published key set

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, encode};
use rsa::RsaPrivateKey;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use serde::Serialize;

use super::error::{IdpError, Result};
use crate::auth::{self, Jwk, JwkSet, KeyResolver, ResolvedKey, VerifyError};

/// RSA modulus size for generated keys
const RSA_KEY_BITS: usize = 2048;

struct KeyMaterial {
    kid: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
    public: Jwk,
}

/// RS256 signing key of the emulator. Cheap to clone.
#[derive(Clone)]
pub struct SigningKey {
    inner: Arc<KeyMaterial>,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.inner.kid)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Generate a fresh key pair. Tokens signed by a previous process become
    /// unverifiable, which is fine for a test double.
    pub fn generate(kid: impl Into<String>) -> Result<Self> {
        let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, RSA_KEY_BITS)
            .map_err(|e| IdpError::Key(format!("failed to generate RSA key: {e}")))?;
        Self::from_private_key(kid.into(), &private)
    }

    /// Load a PKCS#8 or PKCS#1 PEM encoded RSA private key.
    pub fn from_pem(kid: impl Into<String>, pem: &str) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| IdpError::Key(format!("invalid RSA private key: {e}")))?;
        Self::from_private_key(kid.into(), &private)
    }

    fn from_private_key(kid: String, private: &RsaPrivateKey) -> Result<Self> {
        let der = private
            .to_pkcs1_der()
            .map_err(|e| IdpError::Key(format!("failed to encode RSA key: {e}")))?;
        let encoding = EncodingKey::from_rsa_der(der.as_bytes());

        let n = URL_SAFE_NO_PAD.encode(private.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(private.e().to_bytes_be());
        let decoding = DecodingKey::from_rsa_components(&n, &e)
            .map_err(|err| IdpError::Key(format!("invalid RSA components: {err}")))?;

        let public = Jwk {
            kid: Some(kid.clone()),
            kty: "RSA".to_string(),
            alg: Some("RS256".to_string()),
            r#use: Some("sig".to_string()),
            n: Some(n),
            e: Some(e),
            crv: None,
            x: None,
            y: None,
        };

        Ok(Self {
            inner: Arc::new(KeyMaterial {
                kid,
                encoding,
                decoding,
                public,
            }),
        })
    }

    pub fn kid(&self) -> &str {
        &self.inner.kid
    }

    /// Sign a payload as a compact RS256 JWT carrying this key's `kid`.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.inner.kid.clone());
        encode(&header, claims, &self.inner.encoding).map_err(|e| IdpError::Signing(e.to_string()))
    }

    /// Public half as a key set document.
    pub fn jwks(&self) -> JwkSet {
        JwkSet {
            keys: vec![self.inner.public.clone()],
        }
    }
}

#[async_trait]
impl KeyResolver for SigningKey {
    async fn resolve_key(&self, kid: &str) -> auth::Result<ResolvedKey> {
        if kid != self.inner.kid {
            return Err(VerifyError::UnknownKey(kid.to_string()));
        }
        Ok(ResolvedKey {
            kid: self.inner.kid.clone(),
            algorithm: Algorithm::RS256,
            key: self.inner.decoding.clone(),
        })
    }
}

/// One key per test binary; RSA generation is too slow to repeat per test.
#[cfg(test)]
pub(crate) fn test_signing_key() -> &'static SigningKey {
    use std::sync::LazyLock;

    static KEY: LazyLock<SigningKey> = LazyLock::new(|| {
        SigningKey::generate(crate::DEFAULT_KEY_ID).expect("generate test signing key")
    });
    &KEY
}
