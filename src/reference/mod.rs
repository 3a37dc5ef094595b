//! Durable reference data: the source of truth for coin, wallet and worker IDs.
//!
//! Lookups return `Ok(None)` when the entity is absent and `Err` only on a
//! system failure. Creates are idempotent under natural-key collision: a
//! create for a key that already exists returns the existing ID.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Wallet, Worker};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} '{key}' was not found after insert")]
    MissingAfterInsert { entity: &'static str, key: String },

    #[error("Reference store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CoinStore: Send + Sync {
    async fn get_coin_id_by_name(&self, symbol: &str) -> Result<Option<i64>, StoreError>;
}

#[async_trait]
pub trait MinerStore: Send + Sync {
    async fn get_wallet_id_by_name(
        &self,
        name: &str,
        coin_id: i64,
        reward_method: &str,
    ) -> Result<Option<i64>, StoreError>;

    async fn get_worker_id_by_name(
        &self,
        workerfull: &str,
        coin_id: i64,
        reward_method: &str,
    ) -> Result<Option<i64>, StoreError>;

    /// `wallet.id` is ignored; the assigned (or existing) ID is returned.
    async fn create_wallet(&self, wallet: &Wallet) -> Result<i64, StoreError>;

    /// `worker.id` is ignored; the assigned (or existing) ID is returned.
    async fn create_worker(&self, worker: &Worker) -> Result<i64, StoreError>;
}
