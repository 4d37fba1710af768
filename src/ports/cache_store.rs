//! Optional cache interface (§6.4). The engine never calls this itself --
//! it is plumbed through `BuildEngineOptions` purely so tool functions that
//! want a cache (e.g. a host's HTTP tool) have one without reaching past
//! the engine for it.

use async_trait::async_trait;

use crate::engine::value::Value;

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;
    async fn set(&self, key: &str, value: Value, ttl_seconds: u64);
}
