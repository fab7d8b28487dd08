//! Cache layer
//!
//! Process-local page cache backed by moka. Rendered storefront pages that
//! are identical for every anonymous visitor of a marketplace (the home page)
//! are kept here for a few minutes, keyed by marketplace.
//!
//! # Usage
//!
//! ```rust,ignore
//! use marketfront::cache::{create_cache, CacheLayer};
//! use marketfront::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default());
//! cache.set("home:1", &"<html>..</html>", Duration::from_secs(300)).await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

/// Cache layer trait
///
/// The generic methods make this trait unusable as `dyn CacheLayer`; the
/// `Cache` enum provides runtime dispatch instead.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Get a value from cache
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Set a value in cache with its own TTL
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;
}

pub use memory::MemoryCache;

/// Unified cache enum for runtime polymorphism
#[derive(Debug)]
pub enum Cache {
    /// In-memory cache using moka
    Memory(MemoryCache),
}

#[async_trait]
impl CacheLayer for Cache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self {
            Cache::Memory(cache) => cache.get(key).await,
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.set(key, value, ttl).await,
        }
    }
}

/// Create the process cache from configuration
pub fn create_cache(config: &CacheConfig) -> Arc<Cache> {
    let ttl = Duration::from_secs(config.ttl_seconds);
    let cache = MemoryCache::with_capacity_and_ttl(config.max_capacity, ttl);
    Arc::new(Cache::Memory(cache))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_memory_cache() {
        let cache = create_cache(&CacheConfig::default());

        cache
            .set("test_key", &"test_value".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let result: Option<String> = cache.get("test_key").await.unwrap();
        assert_eq!(result, Some("test_value".to_string()));
    }

    #[tokio::test]
    async fn test_entry_ttl_capped_by_config() {
        let cache = create_cache(&CacheConfig {
            ttl_seconds: 0,
            max_capacity: 100,
        });

        cache.set("home:1", &"<html>".to_string(), Duration::from_secs(300)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get::<String>("home:1").await.unwrap(), None);
    }
}
