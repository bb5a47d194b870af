//! Key-value backends for session records

mod error;
mod memory;
mod provider;
mod redis_store;

use std::sync::Arc;

pub use error::{KvError, KvResult};
pub use memory::MemoryKvStore;
pub use provider::KvStore;
pub use redis_store::RedisKvStore;

/// Open the store named by `url`: `memory://` or `redis://` / `rediss://`.
pub async fn connect(url: &str) -> KvResult<Arc<dyn KvStore>> {
    let scheme = url.split_once("://").map_or("", |(scheme, _)| scheme);
    match scheme {
        "memory" => Ok(Arc::new(MemoryKvStore::new())),
        "redis" | "rediss" => Ok(Arc::new(RedisKvStore::connect(url).await?)),
        _ => Err(KvError::UnsupportedUrl(url.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_memory() {
        let store = connect("memory://").await.unwrap();
        assert_eq!(store.backend(), "memory");
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_scheme() {
        let result = connect("postgres://localhost/sessions").await;
        assert!(matches!(result, Err(KvError::UnsupportedUrl(_))));

        let result = connect("not a url").await;
        assert!(matches!(result, Err(KvError::UnsupportedUrl(_))));
    }
}
