//! Per-partition batching consumer.
//!
//! ```text
//! ACCUMULATING --(batch full | flush timer, buffer not empty)--> FLUSHING
//! FLUSHING --(written + committed | failed, offsets left)--> ACCUMULATING
//! any --(shutdown | partition closed)--> DRAINING --> STOPPED
//! ```
//!
//! Message arrival, the flush timer and shutdown are raced in one `select!`,
//! so the buffer only ever has a single owner. Offsets are committed only
//! after the sink accepted the batch; a failed flush drops the buffer and
//! rewinds the reader, so those messages are delivered again.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::config::{ConsumerSettings, InvalidSharePolicy};
use crate::pipeline::dead_letter::DeadLetterSink;
use crate::pipeline::normalizer::{NormalizeError, ShareNormalizer};
use crate::queue::{PartitionReader, QueueError, QueueMessage};
use crate::sink::{ShareSink, SinkError};

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("Normalization failed at offset {offset}: {source}")]
    Normalize {
        offset: i64,
        #[source]
        source: NormalizeError,
    },

    #[error("Sink write failed: {0}")]
    Sink(#[from] SinkError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Accumulating,
    Flushing,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub flushed_batches: u64,
    pub flushed_shares: u64,
    pub failed_flushes: u64,
    pub dead_lettered: u64,
}

enum Event {
    Shutdown,
    Message(Option<Result<QueueMessage, QueueError>>),
    FlushTimer,
}

pub struct BatchingConsumer {
    reader: Box<dyn PartitionReader>,
    normalizer: Arc<ShareNormalizer>,
    sink: Arc<dyn ShareSink>,
    dead_letters: Arc<dyn DeadLetterSink>,
    settings: ConsumerSettings,
    buffer: Vec<QueueMessage>,
    state: ConsumerState,
    stats: ConsumerStats,
    span: Span,
}

impl BatchingConsumer {
    pub fn new(
        reader: Box<dyn PartitionReader>,
        normalizer: Arc<ShareNormalizer>,
        sink: Arc<dyn ShareSink>,
        dead_letters: Arc<dyn DeadLetterSink>,
        settings: ConsumerSettings,
        span: Span,
    ) -> Self {
        let capacity = settings.batch_size;
        Self {
            reader,
            normalizer,
            sink,
            dead_letters,
            settings,
            buffer: Vec::with_capacity(capacity),
            state: ConsumerState::Accumulating,
            stats: ConsumerStats::default(),
            span,
        }
    }

    /// Consume until shutdown or until the partition closes, then make a
    /// final best-effort flush.
    pub async fn run(self, shutdown: CancellationToken) -> ConsumerStats {
        let span = self.span.clone();
        self.consume(shutdown).instrument(span).await
    }

    async fn consume(mut self, shutdown: CancellationToken) -> ConsumerStats {
        info!(
            "Consumer started on partition {}: batch size {}, flush interval {:?}",
            self.reader.partition(),
            self.settings.batch_size,
            self.settings.flush_interval
        );

        let mut deadline = Instant::now() + self.settings.flush_interval;

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => Event::Shutdown,
                next = self.reader.next_message() => Event::Message(next),
                _ = sleep_until(deadline) => Event::FlushTimer,
            };

            match event {
                Event::Shutdown => {
                    info!("Shutdown requested, {} messages buffered", self.buffer.len());
                    break;
                }
                Event::Message(Some(Ok(message))) => {
                    self.buffer.push(message);
                    if self.buffer.len() >= self.settings.batch_size {
                        self.flush_cycle(&shutdown).await;
                        deadline = Instant::now() + self.settings.flush_interval;
                    }
                }
                Event::Message(Some(Err(e))) => {
                    error!("Failed to read from queue: {}", e);
                    pause(self.settings.retry_delay, &shutdown).await;
                }
                Event::Message(None) => {
                    info!("Partition closed, {} messages buffered", self.buffer.len());
                    break;
                }
                Event::FlushTimer => {
                    if !self.buffer.is_empty() {
                        self.flush_cycle(&shutdown).await;
                    }
                    deadline = Instant::now() + self.settings.flush_interval;
                }
            }
        }

        self.drain().await;
        self.stats
    }

    /// One FLUSHING pass; on failure the buffered offsets stay uncommitted
    /// and the reader goes back to the last commit.
    async fn flush_cycle(&mut self, shutdown: &CancellationToken) {
        if let Err(e) = self.flush().await {
            self.stats.failed_flushes += 1;
            error!("Flush of {} messages failed, offsets not committed: {}", self.buffer.len(), e);

            self.buffer.clear();
            if let Err(e) = self.reader.rewind().await {
                error!("Failed to rewind partition {}: {}", self.reader.partition(), e);
            }
            pause(self.settings.retry_delay, shutdown).await;
        }
        self.transition(ConsumerState::Accumulating);
    }

    async fn flush(&mut self) -> Result<(), ConsumerError> {
        let Some(next_offset) = self.buffer.last().map(|message| message.offset + 1) else {
            return Ok(());
        };
        self.transition(ConsumerState::Flushing);

        let started = std::time::Instant::now();
        let mut shares = Vec::with_capacity(self.buffer.len());
        let mut rejected: Vec<(&QueueMessage, String)> = Vec::new();

        for message in &self.buffer {
            match self.normalizer.normalize_payload(&message.payload).await {
                Ok(share) => shares.push(share),
                Err(e) if e.is_data_integrity() && self.settings.invalid_share_policy == InvalidSharePolicy::DeadLetter => {
                    warn!("Skipping share at offset {}: {}", message.offset, e);
                    rejected.push((message, e.to_string()));
                }
                Err(source) => {
                    return Err(ConsumerError::Normalize {
                        offset: message.offset,
                        source,
                    })
                }
            }
        }

        self.sink.add_shares_batch(&shares).await?;
        self.reader.commit(next_offset).await?;

        // after the commit, so a redelivered batch does not publish them twice
        for (message, reason) in &rejected {
            self.dead_letters.publish(message, reason).await;
        }
        let dead_lettered = rejected.len();

        self.stats.dead_lettered += dead_lettered as u64;
        self.stats.flushed_batches += 1;
        self.stats.flushed_shares += shares.len() as u64;
        self.buffer.clear();

        info!(
            "Flushed {} shares ({} dead-lettered), committed up to offset {} in {:?}",
            shares.len(),
            dead_lettered,
            next_offset,
            started.elapsed()
        );
        Ok(())
    }

    async fn drain(&mut self) {
        self.transition(ConsumerState::Draining);

        if !self.buffer.is_empty() {
            if let Err(e) = self.flush().await {
                self.stats.failed_flushes += 1;
                error!(
                    "Final flush failed, {} messages left uncommitted: {}",
                    self.buffer.len(),
                    e
                );
            }
        }

        self.transition(ConsumerState::Stopped);
        info!("Consumer stopped: {:?}", self.stats);
    }

    fn transition(&mut self, next: ConsumerState) {
        if self.state != next {
            debug!("Consumer state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

/// Sleep for `delay` unless shutdown comes first.
async fn pause(delay: Duration, shutdown: &CancellationToken) {
    tokio::select! {
        _ = sleep(delay) => {}
        _ = shutdown.cancelled() => {}
    }
}
