//! Batching consumer: flush triggers, commit ordering, redelivery, drain.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;
    use tracing::Span;

    use crate::config::{ConsumerSettings, InvalidSharePolicy};
    use crate::models::NormalizedShare;
    use crate::pipeline::{
        run_partitions, total_stats, BatchingConsumer, ConsumerStats, MemoryDeadLetters, PipelineContext,
        ShareNormalizer,
    };
    use crate::queue::{MemoryTopic, PartitionReader};
    use crate::sink::{MemorySink, ShareSink, SinkError};
    use crate::tests::{normalizer_with, payload, raw_event, test_cache, wait_until, FakeReferenceStore};

    /// Fails the first `failures` batches, then delegates to a `MemorySink`.
    struct FlakySink {
        failures: AtomicUsize,
        calls: AtomicUsize,
        inner: MemorySink,
    }

    impl FlakySink {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
                inner: MemorySink::new(),
            })
        }
    }

    #[async_trait]
    impl ShareSink for FlakySink {
        async fn add_shares_batch(&self, shares: &[NormalizedShare]) -> Result<(), SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(SinkError::Unavailable("store is down".to_string()));
            }
            self.inner.add_shares_batch(shares).await
        }
    }

    fn settings(batch_size: usize, flush_interval: Duration, policy: InvalidSharePolicy) -> ConsumerSettings {
        ConsumerSettings {
            batch_size,
            flush_interval,
            retry_delay: Duration::from_millis(100),
            invalid_share_policy: policy,
        }
    }

    async fn normalizer() -> (Arc<FakeReferenceStore>, Arc<ShareNormalizer>) {
        let store = FakeReferenceStore::with_coins(&[("ALPH", 4), ("KAS", 5)]).await;
        let normalizer = Arc::new(normalizer_with(store.clone(), &test_cache()));
        (store, normalizer)
    }

    fn publish_shares(topic: &MemoryTopic, partition: i32, uuids: std::ops::Range<usize>) {
        for i in uuids {
            let event = raw_event(&format!("u-{}", i), "ALPH", &format!("wallet{}.rig{}", i % 2, i));
            topic.publish(partition, payload(&event)).unwrap();
        }
    }

    fn spawn_consumer(
        topic: &MemoryTopic,
        normalizer: Arc<ShareNormalizer>,
        sink: Arc<dyn ShareSink>,
        dead_letters: Arc<MemoryDeadLetters>,
        settings: ConsumerSettings,
        shutdown: &CancellationToken,
    ) -> tokio::task::JoinHandle<ConsumerStats> {
        let consumer = BatchingConsumer::new(
            Box::new(topic.reader(0).unwrap()),
            normalizer,
            sink,
            dead_letters,
            settings,
            Span::none(),
        );
        tokio::spawn(consumer.run(shutdown.clone()))
    }

    fn uuids(shares: &[NormalizedShare]) -> Vec<String> {
        shares.iter().map(|s| s.uuid.clone()).collect()
    }

    #[tokio::test]
    async fn test_flush_when_batch_is_full() {
        let (_, normalizer) = normalizer().await;
        let sink = Arc::new(MemorySink::new());
        let topic = MemoryTopic::new("shares", 1);
        let shutdown = CancellationToken::new();
        publish_shares(&topic, 0, 0..5);

        let handle = spawn_consumer(
            &topic,
            normalizer,
            sink.clone(),
            Arc::new(MemoryDeadLetters::new()),
            settings(5, Duration::from_secs(60), InvalidSharePolicy::Abort),
            &shutdown,
        );
        sink.wait_for_batches(1).await;

        let batches = sink.batches().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(uuids(&batches[0]), vec!["u-0", "u-1", "u-2", "u-3", "u-4"]);
        wait_until(|| topic.committed_offset(0).unwrap() == 5).await;

        shutdown.cancel();
        let stats = handle.await.unwrap();
        assert_eq!(stats.flushed_batches, 1);
        assert_eq!(stats.flushed_shares, 5);
        assert_eq!(stats.failed_flushes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_on_timer_with_partial_batch() {
        let (_, normalizer) = normalizer().await;
        let sink = Arc::new(MemorySink::new());
        let topic = MemoryTopic::new("shares", 1);
        let shutdown = CancellationToken::new();
        publish_shares(&topic, 0, 0..2);

        let started = tokio::time::Instant::now();
        let handle = spawn_consumer(
            &topic,
            normalizer,
            sink.clone(),
            Arc::new(MemoryDeadLetters::new()),
            settings(100, Duration::from_secs(1), InvalidSharePolicy::Abort),
            &shutdown,
        );
        sink.wait_for_batches(1).await;

        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(uuids(&sink.shares().await), vec!["u-0", "u-1"]);
        wait_until(|| topic.committed_offset(0).unwrap() == 2).await;

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_normalization_error_aborts_the_batch() {
        let (_, normalizer) = normalizer().await;
        let sink = FlakySink::new(0);
        let dead_letters = Arc::new(MemoryDeadLetters::new());
        let topic = MemoryTopic::new("shares", 1);
        let shutdown = CancellationToken::new();
        publish_shares(&topic, 0, 0..2);
        topic.publish(0, payload(&raw_event("u-bad", "DOGE", "wallet1.rig1"))).unwrap();
        publish_shares(&topic, 0, 3..5);

        let handle = spawn_consumer(
            &topic,
            normalizer,
            sink.clone(),
            dead_letters.clone(),
            settings(5, Duration::from_secs(60), InvalidSharePolicy::Abort),
            &shutdown,
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown.cancel();
        let stats = handle.await.unwrap();

        assert_eq!(sink.calls.load(Ordering::SeqCst), 0, "the sink is never called");
        assert_eq!(topic.committed_offset(0).unwrap(), 0);
        assert!(stats.failed_flushes >= 1);
        assert_eq!(stats.flushed_batches, 0);
        assert!(dead_letters.letters().await.is_empty());
        // uncommitted messages keep being redelivered
        assert!(topic.delivered_offset(0).unwrap() >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_is_redelivered() {
        let (_, normalizer) = normalizer().await;
        let sink = FlakySink::new(1);
        let topic = MemoryTopic::new("shares", 1);
        publish_shares(&topic, 0, 0..5);
        topic.close();

        let stats = spawn_consumer(
            &topic,
            normalizer,
            sink.clone(),
            Arc::new(MemoryDeadLetters::new()),
            settings(5, Duration::from_secs(60), InvalidSharePolicy::Abort),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        let batches = sink.inner.batches().await;
        assert_eq!(batches.len(), 1, "written exactly once after the retry");
        assert_eq!(uuids(&batches[0]), vec!["u-0", "u-1", "u-2", "u-3", "u-4"]);
        assert_eq!(topic.committed_offset(0).unwrap(), 5);
        assert_eq!(
            stats,
            ConsumerStats {
                flushed_batches: 1,
                flushed_shares: 5,
                failed_flushes: 1,
                dead_lettered: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_dead_letter_policy_skips_bad_events() {
        let (_, normalizer) = normalizer().await;
        let sink = Arc::new(MemorySink::new());
        let dead_letters = Arc::new(MemoryDeadLetters::new());
        let topic = MemoryTopic::new("shares", 1);
        publish_shares(&topic, 0, 0..1);
        topic.publish(0, b"{broken".to_vec()).unwrap();
        topic.publish(0, payload(&raw_event("u-doge", "DOGE", "wallet1.rig1"))).unwrap();
        publish_shares(&topic, 0, 3..4);
        topic.close();

        let stats = spawn_consumer(
            &topic,
            normalizer,
            sink.clone(),
            dead_letters.clone(),
            settings(4, Duration::from_secs(60), InvalidSharePolicy::DeadLetter),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(uuids(&sink.shares().await), vec!["u-0", "u-3"]);
        assert_eq!(topic.committed_offset(0).unwrap(), 4);
        assert_eq!(stats.dead_lettered, 2);

        let letters = dead_letters.letters().await;
        let offsets: Vec<i64> = letters.iter().map(|(message, _)| message.offset).collect();
        assert_eq!(offsets, vec![1, 2]);
        assert!(letters[1].1.contains("DOGE"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_letters_wait_for_the_commit() {
        let (_, normalizer) = normalizer().await;
        let sink = FlakySink::new(1);
        let dead_letters = Arc::new(MemoryDeadLetters::new());
        let topic = MemoryTopic::new("shares", 1);
        publish_shares(&topic, 0, 0..1);
        topic.publish(0, payload(&raw_event("u-bad", "DOGE", "wallet1.rig1"))).unwrap();
        publish_shares(&topic, 0, 2..3);
        topic.close();

        let stats = spawn_consumer(
            &topic,
            normalizer,
            sink.clone(),
            dead_letters.clone(),
            settings(3, Duration::from_secs(60), InvalidSharePolicy::DeadLetter),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(uuids(&sink.inner.shares().await), vec!["u-0", "u-2"]);
        assert_eq!(topic.committed_offset(0).unwrap(), 3);

        let letters = dead_letters.letters().await;
        assert_eq!(letters.len(), 1, "the retried batch publishes its dead letter once");
        assert_eq!(letters[0].0.offset, 1);
        assert_eq!(stats.dead_lettered, 1);
        assert_eq!(stats.failed_flushes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_is_never_dead_lettered() {
        let (store, normalizer) = normalizer().await;
        store.fail_wallet("wallet1").await;
        let sink = Arc::new(MemorySink::new());
        let dead_letters = Arc::new(MemoryDeadLetters::new());
        let topic = MemoryTopic::new("shares", 1);
        publish_shares(&topic, 0, 0..2);
        topic.close();

        let handle = spawn_consumer(
            &topic,
            normalizer,
            sink.clone(),
            dead_letters.clone(),
            settings(2, Duration::from_secs(60), InvalidSharePolicy::DeadLetter),
            &CancellationToken::new(),
        );
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(topic.committed_offset(0).unwrap(), 0);

        store.heal().await;
        let stats = handle.await.unwrap();

        assert!(dead_letters.letters().await.is_empty());
        assert!(stats.failed_flushes >= 1);
        assert_eq!(sink.shares().await.len(), 2);
        assert_eq!(topic.committed_offset(0).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_drains_the_buffer() {
        let (_, normalizer) = normalizer().await;
        let sink = Arc::new(MemorySink::new());
        let topic = MemoryTopic::new("shares", 1);
        let shutdown = CancellationToken::new();
        publish_shares(&topic, 0, 0..3);

        let handle = spawn_consumer(
            &topic,
            normalizer,
            sink.clone(),
            Arc::new(MemoryDeadLetters::new()),
            settings(100, Duration::from_secs(3600), InvalidSharePolicy::Abort),
            &shutdown,
        );
        wait_until(|| topic.delivered_offset(0).unwrap() == 3).await;
        assert_eq!(sink.batch_count(), 0);

        shutdown.cancel();
        let stats = handle.await.unwrap();

        assert_eq!(stats.flushed_batches, 1);
        assert_eq!(uuids(&sink.shares().await), vec!["u-0", "u-1", "u-2"]);
        assert_eq!(topic.committed_offset(0).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_restart_resumes_from_committed_offset() {
        let (_, normalizer) = normalizer().await;
        let sink = Arc::new(MemorySink::new());
        let topic = MemoryTopic::new("shares", 1);
        publish_shares(&topic, 0, 0..3);

        let shutdown = CancellationToken::new();
        let handle = spawn_consumer(
            &topic,
            normalizer.clone(),
            sink.clone(),
            Arc::new(MemoryDeadLetters::new()),
            settings(3, Duration::from_secs(3600), InvalidSharePolicy::Abort),
            &shutdown,
        );
        sink.wait_for_batches(1).await;
        shutdown.cancel();
        handle.await.unwrap();

        publish_shares(&topic, 0, 3..5);
        topic.close();
        spawn_consumer(
            &topic,
            normalizer,
            sink.clone(),
            Arc::new(MemoryDeadLetters::new()),
            settings(3, Duration::from_secs(3600), InvalidSharePolicy::Abort),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(uuids(&sink.shares().await), vec!["u-0", "u-1", "u-2", "u-3", "u-4"]);
        assert_eq!(topic.committed_offset(0).unwrap(), 5);
    }

    #[tokio::test]
    async fn test_one_consumer_per_partition() {
        let (store, normalizer) = normalizer().await;
        let sink = Arc::new(MemorySink::new());
        let topic = MemoryTopic::new("shares", 3);
        for partition in 0..3 {
            publish_shares(&topic, partition, 0..4);
        }
        topic.close();

        let readers: Vec<Box<dyn PartitionReader>> = topic
            .readers()
            .into_iter()
            .map(|reader| Box::new(reader) as Box<dyn PartitionReader>)
            .collect();
        let ctx = PipelineContext {
            normalizer,
            sink: sink.clone(),
            dead_letters: Arc::new(MemoryDeadLetters::new()),
            settings: settings(2, Duration::from_secs(60), InvalidSharePolicy::Abort),
        };

        let stats = run_partitions(readers, ctx, CancellationToken::new()).await;

        assert_eq!(stats.len(), 3);
        assert_eq!(total_stats(&stats).flushed_shares, 12);
        for partition in 0..3 {
            assert_eq!(topic.committed_offset(partition).unwrap(), 4);
        }
        assert_eq!(store.wallet_count().await, 2, "wallets are shared across partitions");
    }
}
