//! Wallet and worker ID cache implementation using Moka

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::debug;

use super::keys::CacheKey;
use super::MinerCache;
use crate::models::{WalletKey, WorkerKey};

/// Caches wallet and worker IDs under one byte budget.
///
/// Entries are weighed by key size, so capacity is an approximate memory
/// bound rather than an entry count.
#[derive(Clone)]
pub struct MinerCacheManager {
    cache: Cache<CacheKey, i64>,
}

impl MinerCacheManager {
    pub fn new(max_bytes: u64, ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder()
            .max_capacity(max_bytes)
            .weigher(|key: &CacheKey, _id: &i64| key.weight());
        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }

        Self { cache: builder.build() }
    }

    async fn get(&self, key: &CacheKey) -> Option<i64> {
        let result = self.cache.get(key).await;
        if result.is_some() {
            debug!("Cache hit for key: {}", key);
        } else {
            debug!("Cache miss for key: {}", key);
        }
        result
    }

    pub async fn invalidate_wallet(&self, key: &WalletKey) {
        self.cache.invalidate(&CacheKey::wallet(key)).await;
    }

    pub async fn invalidate_worker(&self, key: &WorkerKey) {
        self.cache.invalidate(&CacheKey::worker(key)).await;
    }

    /// Total weight of the live entries, after pending evictions ran.
    pub async fn weighted_size(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.weighted_size()
    }
}

#[async_trait]
impl MinerCache for MinerCacheManager {
    async fn get_wallet_id(&self, key: &WalletKey) -> Option<i64> {
        self.get(&CacheKey::wallet(key)).await
    }

    async fn put_wallet_id(&self, key: &WalletKey, id: i64) -> i64 {
        self.cache.insert(CacheKey::wallet(key), id).await;
        id
    }

    async fn get_worker_id(&self, key: &WorkerKey) -> Option<i64> {
        self.get(&CacheKey::worker(key)).await
    }

    async fn put_worker_id(&self, key: &WorkerKey, id: i64) -> i64 {
        self.cache.insert(CacheKey::worker(key), id).await;
        id
    }
}
