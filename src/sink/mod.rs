//! Durable, append-only batch writer for normalized shares.

pub mod clickhouse;
pub mod memory;
pub mod row;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::NormalizedShare;
use crate::validation::ValidationError;

pub use self::clickhouse::ClickhouseShareSink;
pub use self::memory::MemorySink;
pub use self::row::ShareRow;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Rejected share: {0}")]
    InvalidShare(#[from] ValidationError),

    #[error("ClickHouse error: {0}")]
    Clickhouse(#[from] ::clickhouse::error::Error),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ShareSink: Send + Sync {
    /// Writes the whole batch as one insert. Any record that fails
    /// conversion rejects the batch before anything is sent.
    async fn add_shares_batch(&self, shares: &[NormalizedShare]) -> Result<(), SinkError>;
}
