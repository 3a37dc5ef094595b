// Wallet and worker reference queries.
//
// Creates are check-then-insert. The insert itself is `ON CONFLICT DO
// NOTHING` against the natural-key UNIQUE constraint, so when two callers
// race on the same key the loser falls through to a re-read and gets the
// winner's ID.

use async_trait::async_trait;
use chrono::Utc;

use crate::db::SqlReferenceStore;
use crate::models::{Wallet, Worker};
use crate::reference::{MinerStore, StoreError};

#[async_trait]
impl MinerStore for SqlReferenceStore {
    async fn get_wallet_id_by_name(
        &self,
        name: &str,
        coin_id: i64,
        reward_method: &str,
    ) -> Result<Option<i64>, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM wallets WHERE name = ? AND coin_id = ? AND reward_method = ?",
        )
        .bind(name)
        .bind(coin_id)
        .bind(reward_method)
        .fetch_optional(self.pool())
        .await?;

        Ok(id)
    }

    async fn get_worker_id_by_name(
        &self,
        workerfull: &str,
        coin_id: i64,
        reward_method: &str,
    ) -> Result<Option<i64>, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM workers WHERE workerfull = ? AND coin_id = ? AND reward_method = ?",
        )
        .bind(workerfull)
        .bind(coin_id)
        .bind(reward_method)
        .fetch_optional(self.pool())
        .await?;

        Ok(id)
    }

    async fn create_wallet(&self, wallet: &Wallet) -> Result<i64, StoreError> {
        if let Some(id) = self
            .get_wallet_id_by_name(&wallet.name, wallet.coin_id, &wallet.reward_method)
            .await?
        {
            return Ok(id);
        }

        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO wallets (coin_id, name, is_solo, reward_method, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(name, coin_id, reward_method) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(wallet.coin_id)
        .bind(&wallet.name)
        .bind(wallet.is_solo)
        .bind(&wallet.reward_method)
        .bind(Utc::now().timestamp_millis())
        .fetch_optional(self.pool())
        .await?;

        match inserted {
            Some(id) => Ok(id),
            None => self
                .get_wallet_id_by_name(&wallet.name, wallet.coin_id, &wallet.reward_method)
                .await?
                .ok_or_else(|| StoreError::MissingAfterInsert {
                    entity: "wallet",
                    key: wallet.name.clone(),
                }),
        }
    }

    async fn create_worker(&self, worker: &Worker) -> Result<i64, StoreError> {
        if let Some(id) = self
            .get_worker_id_by_name(&worker.workerfull, worker.coin_id, &worker.reward_method)
            .await?
        {
            return Ok(id);
        }

        let now = Utc::now().timestamp_millis();
        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO workers
            (coin_id, workerfull, wallet, worker, server_id, ip, is_solo, reward_method, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(workerfull, coin_id, reward_method) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(worker.coin_id)
        .bind(&worker.workerfull)
        .bind(&worker.wallet)
        .bind(&worker.worker)
        .bind(&worker.server_id)
        .bind(&worker.ip)
        .bind(worker.is_solo)
        .bind(&worker.reward_method)
        .bind(now)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        match inserted {
            Some(id) => Ok(id),
            None => self
                .get_worker_id_by_name(&worker.workerfull, worker.coin_id, &worker.reward_method)
                .await?
                .ok_or_else(|| StoreError::MissingAfterInsert {
                    entity: "worker",
                    key: worker.workerfull.clone(),
                }),
        }
    }
}

impl SqlReferenceStore {
    pub async fn count_wallets(&self, name: &str, coin_id: i64, reward_method: &str) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM wallets WHERE name = ? AND coin_id = ? AND reward_method = ?",
        )
        .bind(name)
        .bind(coin_id)
        .bind(reward_method)
        .fetch_one(self.pool())
        .await?;

        Ok(count)
    }

    pub async fn count_workers(&self, workerfull: &str, coin_id: i64, reward_method: &str) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM workers WHERE workerfull = ? AND coin_id = ? AND reward_method = ?",
        )
        .bind(workerfull)
        .bind(coin_id)
        .bind(reward_method)
        .fetch_one(self.pool())
        .await?;

        Ok(count)
    }
}
