use sqlx::SqlitePool;
use tracing::info;

use crate::db::{CREATE_COINS_TABLE, CREATE_WALLETS_TABLE, CREATE_WORKERS_TABLE};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    info!("Running reference database migrations...");

    sqlx::query(CREATE_COINS_TABLE).execute(pool).await?;
    sqlx::query(CREATE_WALLETS_TABLE).execute(pool).await?;
    sqlx::query(CREATE_WORKERS_TABLE).execute(pool).await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_workers_wallet
         ON workers(wallet, coin_id)"
    )
    .execute(pool)
    .await?;

    info!("Reference database migrations completed successfully");
    Ok(())
}

/// Insert coin symbols that are not present yet. Returns how many were new.
pub async fn seed_coins(pool: &SqlitePool, symbols: &[String]) -> Result<u64, sqlx::Error> {
    let mut inserted = 0;

    for symbol in symbols {
        let result = sqlx::query("INSERT INTO coins (symbol) VALUES (?) ON CONFLICT(symbol) DO NOTHING")
            .bind(symbol)
            .execute(pool)
            .await?;
        inserted += result.rows_affected();
    }

    Ok(inserted)
}
