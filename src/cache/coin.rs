//! Coin ID cache implementation

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::debug;

use super::keys::CacheKey;
use super::CoinCache;

/// Caches coin IDs by symbol. Bounded by entry count.
#[derive(Clone)]
pub struct CoinCacheManager {
    cache: Cache<CacheKey, i64>,
}

impl CoinCacheManager {
    pub fn new(capacity: u64, ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder().max_capacity(capacity);
        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }

        Self { cache: builder.build() }
    }

    /// Drop a symbol from the cache
    pub async fn invalidate(&self, symbol: &str) {
        self.cache.invalidate(&CacheKey::coin(symbol)).await;
        debug!("Invalidated coin cache entry: {}", symbol);
    }

    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

#[async_trait]
impl CoinCache for CoinCacheManager {
    async fn get_coin_id(&self, symbol: &str) -> Option<i64> {
        self.cache.get(&CacheKey::coin(symbol)).await
    }

    async fn put_coin_id(&self, symbol: &str, id: i64) -> i64 {
        self.cache.insert(CacheKey::coin(symbol), id).await;
        debug!("Cached coin {} = {}", symbol, id);
        id
    }
}
