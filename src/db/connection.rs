use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::ReferenceSettings;
use crate::db::migration;

/// Open the reference database, creating it if needed, and bring the schema
/// and seeded coins up to date.
pub async fn establish_connection(settings: &ReferenceSettings) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&settings.database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .connect_with(options)
        .await?;

    migration::run_migrations(&pool).await?;

    let seeded = migration::seed_coins(&pool, &settings.seed_coins).await?;
    info!("Reference database ready at {} ({} coins seeded)", settings.database_url, seeded);

    Ok(pool)
}
