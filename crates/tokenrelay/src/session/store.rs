//! Session records in a key-value store

use std::sync::Arc;
use std::time::Duration;

use super::error::{SessionError, SessionResult};
use super::kv::KvStore;
use super::record::SessionRecord;
use crate::constants::SESSION_KEY_PREFIX;

/// Persists records as JSON under `sess:<session id>`.
#[derive(Debug, Clone)]
pub struct SessionStore {
    kv: Arc<dyn KvStore>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn key(session_id: &str) -> String {
        format!("{SESSION_KEY_PREFIX}{session_id}")
    }

    pub async fn put(
        &self,
        session_id: &str,
        record: &SessionRecord,
        ttl: Duration,
    ) -> SessionResult<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;
        self.kv
            .set_with_expiry(&Self::key(session_id), &json, ttl)
            .await?;
        Ok(())
    }

    /// `None` when no record is stored (never written or evicted).
    pub async fn get(&self, session_id: &str) -> SessionResult<Option<SessionRecord>> {
        let Some(json) = self.kv.get(&Self::key(session_id)).await? else {
            return Ok(None);
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| SessionError::Serialization(e.to_string()))
    }
}
