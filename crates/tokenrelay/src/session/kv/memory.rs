//! In-process key-value store with TTL

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::error::KvResult;
use super::provider::KvStore;

struct Entry {
    value: String,
    /// `None` when the TTL is too large to represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Thread-safe in-memory store. Expired entries are dropped on access and on
/// every write.
#[derive(Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl std::fmt::Debug for MemoryKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKvStore")
            .field("entry_count", &self.entries.read().len())
            .finish()
    }
}

impl MemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<String> {
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                drop(entries);
                self.entries.write().retain(|_, e| !e.is_expired(now));
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        Ok(self.get_at(key, Instant::now()))
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        entries.retain(|_, e| !e.is_expired(now));
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now.checked_add(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryKvStore::new();
        store
            .set_with_expiry("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let store = MemoryKvStore::new();
        store
            .set_with_expiry("k", "one", Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set_with_expiry("k", "two", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent() {
        let store = MemoryKvStore::new();
        store
            .set_with_expiry("k", "v", Duration::from_secs(60))
            .await
            .unwrap();

        let later = Instant::now() + Duration::from_secs(61);
        assert!(store.get_at("k", later).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_zero_ttl_expires_immediately() {
        let store = MemoryKvStore::new();
        store.set_with_expiry("k", "v", Duration::ZERO).await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_never_expires() {
        let store = MemoryKvStore::new();
        store.set_with_expiry("k", "v", Duration::MAX).await.unwrap();

        let much_later = Instant::now() + Duration::from_secs(10 * 365 * 24 * 3600);
        assert_eq!(store.get_at("k", much_later).as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryKvStore::new();
        store
            .set_with_expiry("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert!(store.get("k").await.unwrap().is_none());
    }
}
