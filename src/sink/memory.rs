use async_trait::async_trait;
use tokio::sync::{watch, Mutex};

use super::row::rows_for_batch;
use super::{ShareSink, SinkError};
use crate::models::NormalizedShare;

/// Keeps every accepted batch in memory. Applies the same per-record
/// checks as the ClickHouse sink.
pub struct MemorySink {
    batches: Mutex<Vec<Vec<NormalizedShare>>>,
    written: watch::Sender<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        let (written, _) = watch::channel(0);
        Self {
            batches: Mutex::new(Vec::new()),
            written,
        }
    }

    pub async fn batches(&self) -> Vec<Vec<NormalizedShare>> {
        self.batches.lock().await.clone()
    }

    pub async fn shares(&self) -> Vec<NormalizedShare> {
        self.batches.lock().await.iter().flatten().cloned().collect()
    }

    pub fn batch_count(&self) -> usize {
        *self.written.borrow()
    }

    /// Resolves once at least `count` batches have been accepted.
    pub async fn wait_for_batches(&self, count: usize) {
        let mut rx = self.written.subscribe();
        // the sender lives in self, so the channel cannot close here
        let _ = rx.wait_for(|written| *written >= count).await;
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShareSink for MemorySink {
    async fn add_shares_batch(&self, shares: &[NormalizedShare]) -> Result<(), SinkError> {
        if shares.is_empty() {
            return Ok(());
        }
        rows_for_batch(shares)?;

        let mut batches = self.batches.lock().await;
        batches.push(shares.to_vec());
        self.written.send_replace(batches.len());
        Ok(())
    }
}
