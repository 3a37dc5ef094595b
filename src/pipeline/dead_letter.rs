use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use crate::queue::QueueMessage;

/// Destination for events that can never be normalized.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn publish(&self, message: &QueueMessage, reason: &str);
}

/// Writes dead letters to the log, payload included.
pub struct LogDeadLetters;

#[async_trait]
impl DeadLetterSink for LogDeadLetters {
    async fn publish(&self, message: &QueueMessage, reason: &str) {
        warn!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            payload = %String::from_utf8_lossy(&message.payload),
            "Dead-lettered share: {}",
            reason
        );
    }
}

#[derive(Default)]
pub struct MemoryDeadLetters {
    letters: Mutex<Vec<(QueueMessage, String)>>,
}

impl MemoryDeadLetters {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn letters(&self) -> Vec<(QueueMessage, String)> {
        self.letters.lock().await.clone()
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetters {
    async fn publish(&self, message: &QueueMessage, reason: &str) {
        self.letters.lock().await.push((message.clone(), reason.to_string()));
    }
}
