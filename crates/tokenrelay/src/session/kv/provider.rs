//! Key-value store trait

use std::time::Duration;

use async_trait::async_trait;

use super::error::KvResult;

/// String key-value service with per-key expiry.
#[async_trait]
pub trait KvStore: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// Store `value`, replacing any previous value, expiring after `ttl`.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> KvResult<bool>;

    /// Backend name for logs.
    fn backend(&self) -> &'static str;
}
