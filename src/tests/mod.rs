//! Shared doubles and helpers for the unit tests.

pub mod consumer_tests;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::cache::{self, AppCache};
use crate::config::CacheSettings;
use crate::db::migration;
use crate::models::{RawShareEvent, Wallet, Worker};
use crate::pipeline::ShareNormalizer;
use crate::reference::{CoinStore, MinerStore, StoreError};

/// Reference store held in hash maps, with call counters and failure
/// injection.
#[derive(Default)]
pub struct FakeReferenceStore {
    coins: Mutex<HashMap<String, i64>>,
    wallets: Mutex<HashMap<(String, i64, String), i64>>,
    workers: Mutex<HashMap<(String, i64, String), i64>>,
    next_id: Mutex<i64>,
    /// Lookups of this wallet name fail with `Unavailable`.
    failing_wallet: Mutex<Option<String>>,
    /// Worker creates fail while this is above zero.
    failing_worker_creates: AtomicUsize,
    pub coin_lookups: AtomicUsize,
    pub wallet_lookups: AtomicUsize,
    pub worker_lookups: AtomicUsize,
    pub wallet_creates: AtomicUsize,
    pub worker_creates: AtomicUsize,
}

impl FakeReferenceStore {
    pub async fn with_coins(coins: &[(&str, i64)]) -> Arc<Self> {
        let store = Self::default();
        *store.next_id.lock().await = 100;
        {
            let mut map = store.coins.lock().await;
            for (symbol, id) in coins {
                map.insert(symbol.to_string(), *id);
            }
        }
        Arc::new(store)
    }

    pub async fn fail_wallet(&self, name: &str) {
        *self.failing_wallet.lock().await = Some(name.to_string());
    }

    pub async fn heal(&self) {
        *self.failing_wallet.lock().await = None;
    }

    pub fn fail_worker_creates(&self, times: usize) {
        self.failing_worker_creates.store(times, Ordering::SeqCst);
    }

    pub async fn wallet_count(&self) -> usize {
        self.wallets.lock().await.len()
    }

    pub async fn worker_count(&self) -> usize {
        self.workers.lock().await.len()
    }

    async fn next_id(&self) -> i64 {
        let mut next = self.next_id.lock().await;
        *next += 1;
        *next
    }
}

#[async_trait]
impl CoinStore for FakeReferenceStore {
    async fn get_coin_id_by_name(&self, symbol: &str) -> Result<Option<i64>, StoreError> {
        self.coin_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.coins.lock().await.get(symbol).copied())
    }
}

#[async_trait]
impl MinerStore for FakeReferenceStore {
    async fn get_wallet_id_by_name(
        &self,
        name: &str,
        coin_id: i64,
        reward_method: &str,
    ) -> Result<Option<i64>, StoreError> {
        self.wallet_lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing_wallet.lock().await.as_deref() == Some(name) {
            return Err(StoreError::Unavailable(format!("wallet lookup for {}", name)));
        }
        let key = (name.to_string(), coin_id, reward_method.to_string());
        Ok(self.wallets.lock().await.get(&key).copied())
    }

    async fn get_worker_id_by_name(
        &self,
        workerfull: &str,
        coin_id: i64,
        reward_method: &str,
    ) -> Result<Option<i64>, StoreError> {
        self.worker_lookups.fetch_add(1, Ordering::SeqCst);
        let key = (workerfull.to_string(), coin_id, reward_method.to_string());
        Ok(self.workers.lock().await.get(&key).copied())
    }

    async fn create_wallet(&self, wallet: &Wallet) -> Result<i64, StoreError> {
        self.wallet_creates.fetch_add(1, Ordering::SeqCst);
        let key = (wallet.name.clone(), wallet.coin_id, wallet.reward_method.clone());
        if let Some(id) = self.wallets.lock().await.get(&key) {
            return Ok(*id);
        }
        let id = self.next_id().await;
        Ok(*self.wallets.lock().await.entry(key).or_insert(id))
    }

    async fn create_worker(&self, worker: &Worker) -> Result<i64, StoreError> {
        self.worker_creates.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_worker_creates.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_worker_creates.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable(format!("worker create for {}", worker.workerfull)));
        }
        let key = (worker.workerfull.clone(), worker.coin_id, worker.reward_method.clone());
        if let Some(id) = self.workers.lock().await.get(&key) {
            return Ok(*id);
        }
        let id = self.next_id().await;
        Ok(*self.workers.lock().await.entry(key).or_insert(id))
    }
}

pub fn test_cache() -> AppCache {
    cache::init_cache(&CacheSettings {
        coin_capacity: 1_000,
        miner_max_bytes: 1 << 20,
        ttl: None,
    })
}

pub fn normalizer_with(store: Arc<FakeReferenceStore>, cache: &AppCache) -> ShareNormalizer {
    ShareNormalizer::new(
        Arc::new(cache.coin_cache.clone()),
        store.clone(),
        Arc::new(cache.miner_cache.clone()),
        store,
        ".",
    )
}

/// A single-connection in-memory SQLite pool with the schema applied.
/// The connection must never be recycled or the database is lost.
pub async fn memory_pool(seed: &[&str]) -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    migration::run_migrations(&pool).await.expect("migrations");
    let seed: Vec<String> = seed.iter().map(|s| s.to_string()).collect();
    migration::seed_coins(&pool, &seed).await.expect("seed coins");
    pool
}

pub fn raw_event(uuid: &str, coin: &str, workerfull: &str) -> RawShareEvent {
    RawShareEvent {
        uuid: uuid.to_string(),
        block_type: "share".to_string(),
        server_id: "eu1".to_string(),
        coin_symbol: coin.to_string(),
        workerfull: workerfull.to_string(),
        share_date: 1_700_000_000_000,
        current_hashrate: 1_000,
        average_hashrate: 900,
        difficulty: "0.0026".to_string(),
        sharedif: "1.25".to_string(),
        nonce: "00ff00ff".to_string(),
        miner_ip: "10.0.0.7".to_string(),
        is_solo: false,
        reward_method: "PPLNS".to_string(),
        cost: "0".to_string(),
    }
}

pub fn payload(event: &RawShareEvent) -> Vec<u8> {
    serde_json::to_vec(event).expect("serialize share")
}

/// Poll `check` until it holds, yielding to other tasks in between.
pub async fn wait_until<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..1_000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
