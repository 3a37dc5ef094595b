//! Resolves the symbolic references of a raw share (coin symbol, wallet,
//! worker) into canonical IDs.
//!
//! Every reference goes cache first, then the reference store, and the
//! resolved ID is written back to the cache. Wallets and workers that the
//! store does not know yet are created; an unknown coin is a data fault
//! because coins are seeded ahead of time.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::cache::{CoinCache, MinerCache};
use crate::models::{NormalizedShare, RawShareEvent, Wallet, WalletKey, Worker, WorkerKey};
use crate::pipeline::names::{wallet_from_workerfull, worker_from_workerfull};
use crate::reference::{CoinStore, MinerStore, StoreError};

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Malformed share payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Share {uuid} has an empty {field}")]
    MissingField { uuid: String, field: &'static str },

    #[error("Coin '{0}' is not present in reference data")]
    UnknownCoin(String),

    #[error("{entity} ID must be greater than 0, got {id}")]
    InvalidId { entity: &'static str, id: i64 },

    #[error("Reference store error: {0}")]
    Store(#[from] StoreError),
}

impl NormalizeError {
    /// Faults carried by the event itself. Redelivering the same event
    /// cannot fix them, unlike store failures.
    pub fn is_data_integrity(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}

pub struct ShareNormalizer {
    coin_cache: Arc<dyn CoinCache>,
    coin_store: Arc<dyn CoinStore>,
    miner_cache: Arc<dyn MinerCache>,
    miner_store: Arc<dyn MinerStore>,
    worker_separator: String,
}

impl ShareNormalizer {
    pub fn new(
        coin_cache: Arc<dyn CoinCache>,
        coin_store: Arc<dyn CoinStore>,
        miner_cache: Arc<dyn MinerCache>,
        miner_store: Arc<dyn MinerStore>,
        worker_separator: &str,
    ) -> Self {
        Self {
            coin_cache,
            coin_store,
            miner_cache,
            miner_store,
            worker_separator: worker_separator.to_string(),
        }
    }

    /// Decode a queue payload and normalize it.
    pub async fn normalize_payload(&self, payload: &[u8]) -> Result<NormalizedShare, NormalizeError> {
        let event = RawShareEvent::from_slice(payload)?;
        self.normalize(&event).await
    }

    #[instrument(skip_all, fields(uuid = %event.uuid, coin = %event.coin_symbol))]
    pub async fn normalize(&self, event: &RawShareEvent) -> Result<NormalizedShare, NormalizeError> {
        if event.workerfull.is_empty() {
            return Err(NormalizeError::MissingField {
                uuid: event.uuid.clone(),
                field: "workerfull",
            });
        }

        let coin_id = self.resolve_coin(&event.coin_symbol).await?;
        let wallet_id = self.resolve_wallet(event, coin_id).await?;
        let worker_id = self.resolve_worker(event, coin_id).await?;

        Ok(event.to_normalized(coin_id, wallet_id, worker_id))
    }

    async fn resolve_coin(&self, symbol: &str) -> Result<i64, NormalizeError> {
        if let Some(id) = cached(self.coin_cache.get_coin_id(symbol).await) {
            return Ok(id);
        }

        let id = self
            .coin_store
            .get_coin_id_by_name(symbol)
            .await?
            .ok_or_else(|| NormalizeError::UnknownCoin(symbol.to_string()))?;
        ensure_positive("coin", id)?;
        debug!("Resolved coin {} = {} from reference store", symbol, id);

        Ok(self.coin_cache.put_coin_id(symbol, id).await)
    }

    async fn resolve_wallet(&self, event: &RawShareEvent, coin_id: i64) -> Result<i64, NormalizeError> {
        let name = wallet_from_workerfull(&event.workerfull, &self.worker_separator);
        let key = WalletKey::new(name, coin_id, &event.reward_method);

        if let Some(id) = cached(self.miner_cache.get_wallet_id(&key).await) {
            return Ok(id);
        }

        let id = match self
            .miner_store
            .get_wallet_id_by_name(&key.name, coin_id, &key.reward_method)
            .await?
        {
            Some(id) => id,
            None => {
                let wallet = Wallet {
                    id: 0,
                    coin_id,
                    name: key.name.clone(),
                    reward_method: key.reward_method.clone(),
                    is_solo: event.is_solo,
                };
                let id = self.miner_store.create_wallet(&wallet).await?;
                debug!("Created wallet {} = {}", key.name, id);
                id
            }
        };
        ensure_positive("wallet", id)?;

        Ok(self.miner_cache.put_wallet_id(&key, id).await)
    }

    async fn resolve_worker(&self, event: &RawShareEvent, coin_id: i64) -> Result<i64, NormalizeError> {
        let key = WorkerKey::new(&event.workerfull, coin_id, &event.reward_method);

        if let Some(id) = cached(self.miner_cache.get_worker_id(&key).await) {
            return Ok(id);
        }

        let id = match self
            .miner_store
            .get_worker_id_by_name(&key.workerfull, coin_id, &key.reward_method)
            .await?
        {
            Some(id) => id,
            None => {
                let worker = Worker {
                    id: 0,
                    coin_id,
                    workerfull: event.workerfull.clone(),
                    wallet: wallet_from_workerfull(&event.workerfull, &self.worker_separator).to_string(),
                    worker: worker_from_workerfull(&event.workerfull, &self.worker_separator).to_string(),
                    server_id: event.server_id.clone(),
                    ip: event.miner_ip.clone(),
                    reward_method: event.reward_method.clone(),
                    is_solo: event.is_solo,
                };
                let id = self.miner_store.create_worker(&worker).await?;
                debug!("Created worker {} = {}", key.workerfull, id);
                id
            }
        };
        ensure_positive("worker", id)?;

        Ok(self.miner_cache.put_worker_id(&key, id).await)
    }
}

/// A cached zero or negative ID counts as a miss.
fn cached(id: Option<i64>) -> Option<i64> {
    id.filter(|id| *id > 0)
}

fn ensure_positive(entity: &'static str, id: i64) -> Result<(), NormalizeError> {
    if id > 0 {
        Ok(())
    } else {
        Err(NormalizeError::InvalidId { entity, id })
    }
}
