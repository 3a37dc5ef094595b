//! In-process partitioned topic.
//!
//! Keeps every published payload, tracks a committed offset per partition
//! and serves readers from it. Used by the service binary (fed with JSON
//! lines from stdin), the smoke binary and tests.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{PartitionReader, QueueError, QueueMessage};

struct PartitionLog {
    messages: Mutex<Vec<Vec<u8>>>,
    committed: AtomicI64,
    delivered: AtomicI64,
    appended: Notify,
}

impl PartitionLog {
    fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            committed: AtomicI64::new(0),
            delivered: AtomicI64::new(0),
            appended: Notify::new(),
        }
    }

    fn get(&self, offset: i64) -> Option<Vec<u8>> {
        let messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        usize::try_from(offset).ok().and_then(|idx| messages.get(idx).cloned())
    }

    fn len(&self) -> i64 {
        let messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        messages.len() as i64
    }
}

struct TopicInner {
    name: String,
    partitions: Vec<Arc<PartitionLog>>,
    closed: AtomicBool,
    next_partition: AtomicUsize,
}

#[derive(Clone)]
pub struct MemoryTopic {
    inner: Arc<TopicInner>,
}

impl MemoryTopic {
    pub fn new(name: &str, partitions: usize) -> Self {
        let partitions = (0..partitions.max(1)).map(|_| Arc::new(PartitionLog::new())).collect();
        Self {
            inner: Arc::new(TopicInner {
                name: name.to_string(),
                partitions,
                closed: AtomicBool::new(false),
                next_partition: AtomicUsize::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn partition_count(&self) -> usize {
        self.inner.partitions.len()
    }

    fn log(&self, partition: i32) -> Result<&Arc<PartitionLog>, QueueError> {
        usize::try_from(partition)
            .ok()
            .and_then(|idx| self.inner.partitions.get(idx))
            .ok_or(QueueError::UnknownPartition(partition))
    }

    /// Append a payload; returns its offset.
    pub fn publish(&self, partition: i32, payload: impl Into<Vec<u8>>) -> Result<i64, QueueError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed(partition));
        }
        let log = self.log(partition)?;
        let offset = {
            let mut messages = log.messages.lock().unwrap_or_else(PoisonError::into_inner);
            messages.push(payload.into());
            messages.len() as i64 - 1
        };
        log.appended.notify_waiters();
        Ok(offset)
    }

    pub fn publish_json<T: Serialize>(&self, partition: i32, value: &T) -> Result<i64, QueueError> {
        let payload = serde_json::to_vec(value).map_err(|e| QueueError::Backend(e.to_string()))?;
        self.publish(partition, payload)
    }

    /// Publish to partitions in turn.
    pub fn publish_round_robin(&self, payload: impl Into<Vec<u8>>) -> Result<i64, QueueError> {
        let idx = self.inner.next_partition.fetch_add(1, Ordering::Relaxed) % self.partition_count();
        self.publish(idx as i32, payload)
    }

    /// No more publishes; readers return `None` once they are drained.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        for log in &self.inner.partitions {
            log.appended.notify_waiters();
        }
    }

    pub fn committed_offset(&self, partition: i32) -> Result<i64, QueueError> {
        Ok(self.log(partition)?.committed.load(Ordering::Acquire))
    }

    /// Offset just past the last message handed to a reader.
    pub fn delivered_offset(&self, partition: i32) -> Result<i64, QueueError> {
        Ok(self.log(partition)?.delivered.load(Ordering::Acquire))
    }

    /// A reader positioned at the partition's committed offset.
    pub fn reader(&self, partition: i32) -> Result<MemoryPartitionReader, QueueError> {
        let log = self.log(partition)?.clone();
        let position = log.committed.load(Ordering::Acquire);
        Ok(MemoryPartitionReader {
            topic: self.clone(),
            partition,
            log,
            position,
        })
    }

    pub fn readers(&self) -> Vec<MemoryPartitionReader> {
        (0..self.partition_count() as i32)
            .filter_map(|partition| self.reader(partition).ok())
            .collect()
    }

    /// Publish every non-empty line received on `lines` until the sender
    /// goes away or shutdown, then close the topic.
    pub async fn feed_lines(&self, mut lines: mpsc::Receiver<String>, shutdown: CancellationToken) -> usize {
        let mut published = 0;

        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => break,
                line = lines.recv() => line,
            };

            let Some(line) = line else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match self.publish_round_robin(line.as_bytes().to_vec()) {
                Ok(_) => published += 1,
                Err(e) => {
                    warn!("Failed to publish line: {}", e);
                    break;
                }
            }
        }

        info!("Input feeder finished after {} messages on topic {}", published, self.name());
        self.close();
        published
    }
}

/// Read stdin line by line on a dedicated OS thread.
///
/// The thread is not owned by the runtime, so a read blocked on stdin never
/// holds up runtime shutdown. The channel closes at EOF or on a read error.
pub fn stdin_lines(capacity: usize) -> std::io::Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    std::thread::Builder::new().name("stdin-reader".to_string()).spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
        debug!("stdin reader finished");
    })?;

    Ok(rx)
}

pub struct MemoryPartitionReader {
    topic: MemoryTopic,
    partition: i32,
    log: Arc<PartitionLog>,
    position: i64,
}

#[async_trait]
impl PartitionReader for MemoryPartitionReader {
    fn partition(&self) -> i32 {
        self.partition
    }

    async fn next_message(&mut self) -> Option<Result<QueueMessage, QueueError>> {
        loop {
            // Register before checking so a publish in between is not missed.
            let notified = self.log.appended.notified();

            if let Some(payload) = self.log.get(self.position) {
                let offset = self.position;
                self.position += 1;
                self.log.delivered.fetch_max(self.position, Ordering::AcqRel);
                return Some(Ok(QueueMessage {
                    topic: self.topic.name().to_string(),
                    partition: self.partition,
                    offset,
                    payload,
                }));
            }

            if self.topic.inner.closed.load(Ordering::Acquire) {
                return None;
            }

            notified.await;
        }
    }

    async fn commit(&mut self, next_offset: i64) -> Result<(), QueueError> {
        if next_offset > self.log.len() {
            return Err(QueueError::Backend(format!(
                "commit offset {} is past the end of partition {}",
                next_offset, self.partition
            )));
        }
        self.log.committed.fetch_max(next_offset, Ordering::AcqRel);
        debug!("Committed partition {} up to offset {}", self.partition, next_offset);
        Ok(())
    }

    async fn rewind(&mut self) -> Result<(), QueueError> {
        self.position = self.log.committed.load(Ordering::Acquire);
        debug!("Rewound partition {} to offset {}", self.partition, self.position);
        Ok(())
    }
}
