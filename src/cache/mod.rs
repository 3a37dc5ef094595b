//! In-memory identifier caches sitting in front of the reference store.
//!
//! Entries carry no authority: any lookup may miss at any time and callers
//! fall back to the reference store.

pub mod coin;
pub mod keys;
pub mod miner;

use async_trait::async_trait;

use crate::config::CacheSettings;
use crate::models::{WalletKey, WorkerKey};

pub use coin::CoinCacheManager;
pub use keys::CacheKey;
pub use miner::MinerCacheManager;

/// Coin ID lookups by symbol.
#[async_trait]
pub trait CoinCache: Send + Sync {
    async fn get_coin_id(&self, symbol: &str) -> Option<i64>;

    /// Stores (or overwrites) the ID and returns it.
    async fn put_coin_id(&self, symbol: &str, id: i64) -> i64;
}

/// Wallet and worker ID lookups by natural key.
#[async_trait]
pub trait MinerCache: Send + Sync {
    async fn get_wallet_id(&self, key: &WalletKey) -> Option<i64>;

    async fn put_wallet_id(&self, key: &WalletKey, id: i64) -> i64;

    async fn get_worker_id(&self, key: &WorkerKey) -> Option<i64>;

    async fn put_worker_id(&self, key: &WorkerKey, id: i64) -> i64;
}

/// Both identifier caches, shared by every normalizer in the process.
#[derive(Clone)]
pub struct AppCache {
    pub coin_cache: CoinCacheManager,
    pub miner_cache: MinerCacheManager,
}

pub fn init_cache(settings: &CacheSettings) -> AppCache {
    AppCache {
        coin_cache: CoinCacheManager::new(settings.coin_capacity, settings.ttl),
        miner_cache: MinerCacheManager::new(settings.miner_max_bytes, settings.ttl),
    }
}
