//! Issued-token registry backing introspection and revocation

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use super::error::{IdpError, Result};
use crate::auth::Claims;
use crate::observability;

/// Lifecycle of an issued token. `Revoked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Active,
    Revoked,
}

impl TokenState {
    /// The only transition.
    #[must_use]
    pub const fn revoke(self) -> Self {
        Self::Revoked
    }

    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub payload: Claims,
    pub state: TokenState,
    pub created_at: i64,
}

/// Result of a successful revoke call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked,
    AlreadyRevoked,
}

impl RevokeOutcome {
    const fn label(self) -> &'static str {
        match self {
            Self::Revoked => "revoked",
            Self::AlreadyRevoked => "already_revoked",
        }
    }
}

/// Introspection response. Unknown, revoked and expired tokens all produce
/// the bare `{"active": false}` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Introspection {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Introspection {
    pub const fn inactive() -> Self {
        Self {
            active: false,
            sub: None,
            username: None,
            exp: None,
            iat: None,
            scope: None,
        }
    }

    fn from_claims(claims: &Claims) -> Self {
        Self {
            active: true,
            sub: Some(claims.sub.clone()),
            username: claims.str_claim("username").map(str::to_string),
            exp: Some(claims.exp),
            iat: claims.iat,
            scope: claims.str_claim("scope").map(str::to_string),
        }
    }
}

/// Concurrent map from opaque token string to its record.
///
/// Revocation mutates a record in place and never removes it; only
/// [`TokenRegistry::sweep_expired`] removes records.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    records: DashMap<String, TokenRecord>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, token: String, payload: Claims, now: i64) {
        self.records.insert(
            token,
            TokenRecord {
                payload,
                state: TokenState::Active,
                created_at: now,
            },
        );
    }

    pub fn introspect(&self, token: &str, now: i64) -> Introspection {
        match self.records.get(token) {
            Some(record) if record.state.is_active() && record.payload.exp >= now => {
                Introspection::from_claims(&record.payload)
            }
            _ => Introspection::inactive(),
        }
    }

    pub fn is_active(&self, token: &str, now: i64) -> bool {
        self.introspect(token, now).active
    }

    /// Revoke a token. Repeating the call is harmless; only never-issued
    /// tokens fail.
    pub fn revoke(&self, token: &str) -> Result<RevokeOutcome> {
        let mut record = self.records.get_mut(token).ok_or(IdpError::NotFound)?;
        let outcome = if record.state.is_active() {
            RevokeOutcome::Revoked
        } else {
            RevokeOutcome::AlreadyRevoked
        };
        record.state = record.state.revoke();
        drop(record);

        observability::record_revocation(outcome.label());
        Ok(outcome)
    }

    pub fn state(&self, token: &str) -> Option<TokenState> {
        self.records.get(token).map(|r| r.state)
    }

    /// Drop records whose expiry has passed. Returns the number removed.
    pub fn sweep_expired(&self, now: i64) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.payload.exp >= now);
        before.saturating_sub(self.records.len())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Periodic registry eviction
pub struct RegistrySweepTask {
    registry: Arc<TokenRegistry>,
    interval: Duration,
}

impl RegistrySweepTask {
    #[must_use]
    pub const fn new(registry: Arc<TokenRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    pub fn spawn(
        self,
        shutdown: tokio_util::sync::CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.registry.sweep_expired(crate::helpers::unix_now());
                        if removed > 0 {
                            tracing::debug!(removed, remaining = self.registry.len(), "Swept expired tokens");
                        }
                    }
                    () = shutdown.cancelled() => {
                        tracing::debug!("Registry sweep task shutting down");
                        break;
                    }
                }
            }
        })
    }
}
