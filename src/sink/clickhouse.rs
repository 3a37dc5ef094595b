use async_trait::async_trait;
use ::clickhouse::Client;
use tracing::{debug, info};

use super::row::{rows_for_batch, ShareRow};
use super::{ShareSink, SinkError};
use crate::config::ClickhouseSettings;
use crate::models::NormalizedShare;

/// Sorting key includes the share UUID so redelivered duplicates collapse
/// when parts merge.
const CREATE_SHARES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS {table} (
    uuid String,
    server_id String,
    coin_id Int64,
    worker_id Int64,
    wallet_id Int64,
    share_date DateTime64(3),
    difficulty Decimal(38, 18),
    sharedif Decimal(38, 18),
    nonce String,
    is_solo Bool,
    reward_method String,
    cost Decimal(38, 18)
)
ENGINE = ReplacingMergeTree
PARTITION BY toYYYYMM(share_date)
ORDER BY (coin_id, wallet_id, share_date, uuid)
"#;

#[derive(Clone)]
pub struct ClickhouseShareSink {
    client: Client,
    table: String,
}

impl ClickhouseShareSink {
    pub fn new(settings: &ClickhouseSettings) -> Self {
        info!("Initializing ClickHouse share sink: {} / {}.{}", settings.url, settings.database, settings.table);

        let client = Client::default()
            .with_url(&settings.url)
            .with_database(&settings.database)
            .with_user(&settings.username)
            .with_password(&settings.password);

        Self {
            client,
            table: settings.table.clone(),
        }
    }

    pub async fn ping(&self) -> Result<(), SinkError> {
        self.client.query("SELECT 1").execute().await?;
        Ok(())
    }

    pub async fn ensure_table_exists(&self) -> Result<(), SinkError> {
        let ddl = CREATE_SHARES_TABLE.replace("{table}", &self.table);
        self.client.query(&ddl).execute().await?;
        info!("Shares table {} created or already exists", self.table);
        Ok(())
    }
}

#[async_trait]
impl ShareSink for ClickhouseShareSink {
    async fn add_shares_batch(&self, shares: &[NormalizedShare]) -> Result<(), SinkError> {
        if shares.is_empty() {
            return Ok(());
        }

        // every row converts before the insert is opened
        let rows = rows_for_batch(shares)?;

        let mut insert = self.client.insert::<ShareRow>(&self.table)?;
        for row in &rows {
            insert.write(row).await?;
        }
        insert.end().await?;

        debug!("Inserted {} shares into {}", rows.len(), self.table);
        Ok(())
    }
}
