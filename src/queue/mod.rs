//! Boundary to the message queue.
//!
//! A consumer drives one `PartitionReader` per partition. Offsets advance
//! only through `commit`, which the consumer calls after a batch has been
//! durably written.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::{stdin_lines, MemoryPartitionReader, MemoryTopic};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    #[error("Unknown partition {0}")]
    UnknownPartition(i32),

    #[error("Partition {0} is closed")]
    Closed(i32),

    #[error("Queue backend error: {0}")]
    Backend(String),
}

/// One delivered message. `offset` is the message's position in its
/// partition; committing `offset + 1` acknowledges it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait PartitionReader: Send {
    fn partition(&self) -> i32;

    /// Waits for the next message; `None` once the partition is closed and
    /// drained. Must be cancel-safe: dropping the future loses nothing.
    async fn next_message(&mut self) -> Option<Result<QueueMessage, QueueError>>;

    /// Marks everything before `next_offset` as processed.
    async fn commit(&mut self, next_offset: i64) -> Result<(), QueueError>;

    /// Moves the read position back to the last committed offset so that
    /// uncommitted messages are delivered again.
    async fn rewind(&mut self) -> Result<(), QueueError>;
}
