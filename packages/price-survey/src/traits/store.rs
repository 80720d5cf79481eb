//! Key-value collaborators: the TTL response cache and the property store.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Response cache with per-entry expiry.
///
/// A missing or expired entry is a cache miss, never an error.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a live entry.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store an entry for `ttl`.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
}

#[async_trait]
impl<C: CacheStore + ?Sized> CacheStore for Arc<C> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        (**self).put(key, value, ttl).await
    }
}

/// Durable string properties (checkpoint cursors, cached credentials).
#[async_trait]
pub trait PropertyStore: Send + Sync {
    async fn get_property(&self, key: &str) -> Result<Option<String>>;

    async fn set_property(&self, key: &str, value: &str) -> Result<()>;

    /// Deleting a missing key is not an error.
    async fn delete_property(&self, key: &str) -> Result<()>;
}
