//! Server-side sessions for the edge service
//!
//! A session is authenticated only when both halves hold: the cookie carries
//! a valid, unexpired signature ([`SessionSigner`]) and the store still has a
//! record under it ([`SessionStore`]). The signature window and the store TTL
//! are independent; the store TTL is capped at the signature window.

mod error;
pub mod kv;
mod record;
mod signer;
mod store;

use std::time::Duration;

pub use error::{SessionError, SessionResult};
pub use record::SessionRecord;
pub use signer::SessionSigner;
pub use store::SessionStore;

use crate::constants::{SESSION_SIGNATURE_MAX_AGE, SESSION_STORE_TTL};
use crate::observability;

/// Signer and store combined
#[derive(Debug, Clone)]
pub struct SessionManager {
    signer: SessionSigner,
    store: SessionStore,
    signature_max_age: Duration,
    store_ttl: Duration,
}

impl SessionManager {
    pub fn new(signer: SessionSigner, store: SessionStore) -> Self {
        Self::with_lifetimes(signer, store, SESSION_SIGNATURE_MAX_AGE, SESSION_STORE_TTL)
    }

    pub fn with_lifetimes(
        signer: SessionSigner,
        store: SessionStore,
        signature_max_age: Duration,
        store_ttl: Duration,
    ) -> Self {
        if store_ttl > signature_max_age {
            tracing::warn!(
                ?store_ttl,
                ?signature_max_age,
                "Session store TTL exceeds signature window, capping"
            );
        }
        Self {
            signer,
            store,
            signature_max_age,
            store_ttl: store_ttl.min(signature_max_age),
        }
    }

    pub const fn store_ttl(&self) -> Duration {
        self.store_ttl
    }

    /// Store the record and return the signed session identifier for the cookie.
    pub async fn establish(&self, record: &SessionRecord) -> SessionResult<String> {
        let session_id = self.signer.sign(&record.sub);
        self.store.put(&session_id, record, self.store_ttl).await?;
        tracing::info!(sub = %record.sub, "Session established");
        Ok(session_id)
    }

    /// Record behind a cookie value; fails unless signature and record are
    /// both valid.
    pub async fn resolve(&self, session_id: &str) -> SessionResult<SessionRecord> {
        let outcome = self.resolve_inner(session_id).await;
        let label = outcome.as_ref().map_or_else(SessionError::kind, |_| "found");
        observability::record_session_lookup(label);
        if let Err(e) = &outcome {
            tracing::debug!(reason = e.kind(), "Session rejected");
        }
        outcome
    }

    async fn resolve_inner(&self, session_id: &str) -> SessionResult<SessionRecord> {
        self.signer.unsign(session_id, self.signature_max_age)?;
        self.store
            .get(session_id)
            .await?
            .ok_or(SessionError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::kv::MemoryKvStore;
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(
            SessionSigner::new("secret"),
            SessionStore::new(Arc::new(MemoryKvStore::new())),
        )
    }

    fn record() -> SessionRecord {
        SessionRecord {
            sub: "a1b2c3d4".into(),
            email: Some("testuser@example.com".into()),
            roles: vec!["developers".into(), "poc-team".into()],
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
        }
    }

    #[tokio::test]
    async fn test_establish_then_resolve() {
        let manager = manager();
        let sid = manager.establish(&record()).await.unwrap();
        assert!(sid.starts_with("a1b2c3d4."));
        assert_eq!(manager.resolve(&sid).await.unwrap(), record());
    }

    #[tokio::test]
    async fn test_resolve_rejects_forged_cookie() {
        let manager = manager();
        manager.establish(&record()).await.unwrap();
        let forged = SessionSigner::new("attacker").sign("a1b2c3d4");
        assert!(matches!(
            manager.resolve(&forged).await,
            Err(SessionError::BadSignature)
        ));
    }

    #[tokio::test]
    async fn test_valid_signature_without_record() {
        let manager = manager();
        let sid = SessionSigner::new("secret").sign("someone");
        assert!(matches!(
            manager.resolve(&sid).await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_store_ttl_capped_at_signature_window() {
        let manager = SessionManager::with_lifetimes(
            SessionSigner::new("secret"),
            SessionStore::new(Arc::new(MemoryKvStore::new())),
            Duration::from_secs(60),
            Duration::from_secs(3600),
        );
        assert_eq!(manager.store_ttl(), Duration::from_secs(60));
        assert_eq!(self::manager().store_ttl(), SESSION_STORE_TTL);
    }
}
