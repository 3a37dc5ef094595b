use async_trait::async_trait;

use crate::db::SqlReferenceStore;
use crate::models::Coin;
use crate::reference::{CoinStore, StoreError};

#[async_trait]
impl CoinStore for SqlReferenceStore {
    async fn get_coin_id_by_name(&self, symbol: &str) -> Result<Option<i64>, StoreError> {
        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM coins WHERE symbol = ?")
            .bind(symbol)
            .fetch_optional(self.pool())
            .await?;

        Ok(id)
    }
}

impl SqlReferenceStore {
    pub async fn list_coins(&self) -> Result<Vec<Coin>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, String)>("SELECT id, symbol FROM coins ORDER BY id")
            .fetch_all(self.pool())
            .await?;

        Ok(rows.into_iter().map(|(id, symbol)| Coin { id, symbol }).collect())
    }
}
