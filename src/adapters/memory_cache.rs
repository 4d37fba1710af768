//! In-memory [`CacheStore`] (§6.4): an `Arc<RwLock<HashMap<...>>>` with no
//! eviction beyond a lazily-checked expiry timestamp. The engine never
//! calls this itself -- it exists so tests and embedding hosts have a
//! working cache to pass to tool functions that want one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::engine::value::Value;
use crate::ports::CacheStore;

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Clone, Default)]
pub struct InMemoryCacheStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently stored, expired or not (useful for
    /// tests).
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        match entry.expires_at {
            Some(at) if at <= Instant::now() => None,
            _ => Some(entry.value.clone()),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl_seconds: u64) {
        let expires_at = if ttl_seconds == 0 { None } else { Some(Instant::now() + Duration::from_secs(ttl_seconds)) };
        self.entries.write().await.insert(key.to_string(), Entry { value, expires_at });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_retrieves_values() {
        let cache = InMemoryCacheStore::new();
        cache.set("k", Value::Bool(true), 0).await;
        assert_eq!(cache.get("k").await, Some(Value::Bool(true)));
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let cache = InMemoryCacheStore::new();
        assert_eq!(cache.get("nope").await, None);
    }

    #[tokio::test]
    async fn expired_entry_is_treated_as_absent() {
        let cache = InMemoryCacheStore::new();
        cache.entries.write().await.insert(
            "k".to_string(),
            Entry { value: Value::Bool(true), expires_at: Some(Instant::now() - Duration::from_secs(1)) },
        );
        assert_eq!(cache.get("k").await, None);
    }
}
