//! Tamper-evident, timestamped session identifiers
//!
//! Format: `<value>.<timestamp>.<signature>` where the timestamp is the
//! big-endian signing time in seconds and the signature is HMAC-SHA256 over
//! `<value>.<timestamp>`, both base64url without padding. The value itself
//! may contain dots.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::error::{SessionError, SessionResult};
use crate::helpers::{duration_secs, unix_now};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_SALT: &str = "tokenrelay.session";

#[derive(Clone)]
pub struct SessionSigner {
    key: [u8; 32],
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner").finish_non_exhaustive()
    }
}

impl SessionSigner {
    pub fn new(secret: &str) -> Self {
        Self::with_salt(secret, DEFAULT_SALT)
    }

    /// Signers with different salts never accept each other's output.
    pub fn with_salt(secret: &str, salt: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update([0u8]);
        hasher.update(secret.as_bytes());
        Self {
            key: hasher.finalize().into(),
        }
    }

    pub fn sign(&self, value: &str) -> String {
        self.sign_at(value, unix_now())
    }

    pub fn sign_at(&self, value: &str, timestamp: i64) -> String {
        let ts = encode_timestamp(timestamp);
        let signature = URL_SAFE_NO_PAD.encode(self.mac(value, &ts));
        format!("{value}.{ts}.{signature}")
    }

    /// Recover the signed value if the signature matches and is at most
    /// `max_age` old.
    pub fn unsign(&self, signed: &str, max_age: Duration) -> SessionResult<String> {
        self.unsign_at(signed, max_age, unix_now())
    }

    pub fn unsign_at(&self, signed: &str, max_age: Duration, now: i64) -> SessionResult<String> {
        let mut parts = signed.rsplitn(3, '.');
        let (Some(signature), Some(ts), Some(value)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(SessionError::BadSignature);
        };

        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SessionError::BadSignature)?;
        let expected = self.mac(value, ts);
        if !bool::from(expected.as_slice().ct_eq(&provided)) {
            return Err(SessionError::BadSignature);
        }

        let signed_at = decode_timestamp(ts).ok_or(SessionError::BadSignature)?;
        let age = now.saturating_sub(signed_at);
        if age < 0 || age > duration_secs(max_age) {
            return Err(SessionError::Expired);
        }

        Ok(value.to_string())
    }

    fn mac(&self, value: &str, ts: &str) -> Vec<u8> {
        let mut mac =
            <HmacSha256 as Mac>::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(value.as_bytes());
        mac.update(b".");
        mac.update(ts.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

fn encode_timestamp(timestamp: i64) -> String {
    let bytes = timestamp.max(0).to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    URL_SAFE_NO_PAD.encode(&bytes[first..])
}

fn decode_timestamp(encoded: &str) -> Option<i64> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(&bytes);
    Some(i64::from_be_bytes(buf))
}
