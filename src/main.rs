use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use share_ingest_service::cache;
use share_ingest_service::config::Config;
use share_ingest_service::db::{connection, SqlReferenceStore};
use share_ingest_service::pipeline::{run_partitions, total_stats, LogDeadLetters, PipelineContext, ShareNormalizer};
use share_ingest_service::queue::{stdin_lines, MemoryTopic, PartitionReader};
use share_ingest_service::sink::ClickhouseShareSink;

const STARTUP_RETRIES: usize = 5;

fn startup_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(10))
        .with_max_times(STARTUP_RETRIES)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting share-ingest-service");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };
    info!("Configuration loaded: {:?}", config);

    if config.queue.auto_commit_enabled {
        warn!("KAFKA_AUTO_COMMIT is enabled; offsets may be committed before shares are stored");
    }

    let pool = (|| connection::establish_connection(&config.reference))
        .retry(startup_backoff())
        .notify(|e, delay| warn!("Reference database not ready ({}), retrying in {:?}", e, delay))
        .await?;
    let store = Arc::new(SqlReferenceStore::new(pool));

    let sink = Arc::new(ClickhouseShareSink::new(&config.clickhouse));
    (|| {
        let sink = sink.clone();
        async move {
            sink.ping().await?;
            sink.ensure_table_exists().await
        }
    })
    .retry(startup_backoff())
    .notify(|e, delay| warn!("ClickHouse not ready ({}), retrying in {:?}", e, delay))
    .await?;
    info!("ClickHouse table {} ready", config.clickhouse.table);

    let app_cache = cache::init_cache(&config.cache);
    info!(
        "Caches initialized: {} coins, {} bytes of miner keys, ttl {:?}",
        config.cache.coin_capacity, config.cache.miner_max_bytes, config.cache.ttl
    );

    let normalizer = Arc::new(ShareNormalizer::new(
        Arc::new(app_cache.coin_cache.clone()),
        store.clone(),
        Arc::new(app_cache.miner_cache.clone()),
        store.clone(),
        &config.worker_separator,
    ));

    let ctx = PipelineContext {
        normalizer,
        sink,
        dead_letters: Arc::new(LogDeadLetters),
        settings: config.consumer.clone(),
    };

    let shutdown = CancellationToken::new();
    let topic = MemoryTopic::new(&config.queue.topic, config.queue.partitions);
    info!(
        "Consuming topic {} ({} partitions, group {}, brokers {:?}) from stdin",
        topic.name(),
        topic.partition_count(),
        config.queue.consumer_group,
        config.queue.brokers
    );

    let lines = stdin_lines(config.consumer.batch_size)?;
    let feeder = {
        let topic = topic.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { topic.feed_lines(lines, shutdown).await })
    };

    let signal_shutdown = shutdown.clone();
    let signal_listener = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                signal_shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    let readers: Vec<Box<dyn PartitionReader>> = topic
        .readers()
        .into_iter()
        .map(|reader| Box::new(reader) as Box<dyn PartitionReader>)
        .collect();

    let stats = run_partitions(readers, ctx, shutdown.clone()).await;
    shutdown.cancel();
    signal_listener.abort();

    match feeder.await {
        Ok(published) => info!("Published {} messages", published),
        Err(e) => error!("Input feeder failed: {}", e),
    }

    for (partition, partition_stats) in &stats {
        info!("Partition {}: {:?}", partition, partition_stats);
    }
    info!("Shutdown complete: {:?}", total_stats(&stats));

    Ok(())
}
