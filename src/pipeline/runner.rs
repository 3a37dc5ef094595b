use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span};

use crate::config::ConsumerSettings;
use crate::pipeline::consumer::{BatchingConsumer, ConsumerStats};
use crate::pipeline::dead_letter::DeadLetterSink;
use crate::pipeline::normalizer::ShareNormalizer;
use crate::queue::PartitionReader;
use crate::sink::ShareSink;

/// Everything a partition consumer shares with its siblings.
#[derive(Clone)]
pub struct PipelineContext {
    pub normalizer: Arc<ShareNormalizer>,
    pub sink: Arc<dyn ShareSink>,
    pub dead_letters: Arc<dyn DeadLetterSink>,
    pub settings: ConsumerSettings,
}

struct WorkerHandle {
    partition: i32,
    handle: JoinHandle<ConsumerStats>,
}

/// One consumer task per partition.
pub struct PartitionWorkers {
    workers: Vec<WorkerHandle>,
}

impl PartitionWorkers {
    pub fn spawn(
        readers: Vec<Box<dyn PartitionReader>>,
        ctx: &PipelineContext,
        shutdown: &CancellationToken,
    ) -> Self {
        let mut workers = Vec::with_capacity(readers.len());

        for reader in readers {
            let partition = reader.partition();
            let consumer = BatchingConsumer::new(
                reader,
                ctx.normalizer.clone(),
                ctx.sink.clone(),
                ctx.dead_letters.clone(),
                ctx.settings.clone(),
                info_span!("consumer", partition),
            );

            let handle = tokio::spawn(consumer.run(shutdown.clone()));
            workers.push(WorkerHandle { partition, handle });
        }

        info!("Started {} partition consumers", workers.len());
        Self { workers }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every consumer to stop. A consumer that panicked is logged
    /// and left out of the result.
    pub async fn join(self) -> Vec<(i32, ConsumerStats)> {
        let partitions: Vec<i32> = self.workers.iter().map(|w| w.partition).collect();
        let results = join_all(self.workers.into_iter().map(|w| w.handle)).await;

        partitions
            .into_iter()
            .zip(results)
            .filter_map(|(partition, result)| match result {
                Ok(stats) => Some((partition, stats)),
                Err(e) => {
                    error!("Consumer for partition {} failed: {}", partition, e);
                    None
                }
            })
            .collect()
    }
}

/// Run one consumer per reader until they all stop.
pub async fn run_partitions(
    readers: Vec<Box<dyn PartitionReader>>,
    ctx: PipelineContext,
    shutdown: CancellationToken,
) -> Vec<(i32, ConsumerStats)> {
    PartitionWorkers::spawn(readers, &ctx, &shutdown).join().await
}

/// Totals across partitions.
pub fn total_stats(stats: &[(i32, ConsumerStats)]) -> ConsumerStats {
    stats.iter().fold(ConsumerStats::default(), |mut total, (_, s)| {
        total.flushed_batches += s.flushed_batches;
        total.flushed_shares += s.flushed_shares;
        total.failed_flushes += s.failed_flushes;
        total.dead_lettered += s.dead_lettered;
        total
    })
}
