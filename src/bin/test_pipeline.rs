//! End-to-end smoke run against an in-memory reference database, an
//! in-memory topic and an in-memory sink.

use std::sync::Arc;
use std::time::Duration;

use share_ingest_service::cache;
use share_ingest_service::config::{CacheSettings, ConsumerSettings, InvalidSharePolicy, ReferenceSettings};
use share_ingest_service::db::{connection, SqlReferenceStore};
use share_ingest_service::models::RawShareEvent;
use share_ingest_service::pipeline::{run_partitions, total_stats, MemoryDeadLetters, PipelineContext, ShareNormalizer};
use share_ingest_service::queue::{MemoryTopic, PartitionReader};
use share_ingest_service::sink::MemorySink;
use tokio_util::sync::CancellationToken;
use tracing::info;

fn share(i: usize, coin: &str) -> RawShareEvent {
    RawShareEvent {
        uuid: format!("smoke-{}", i),
        server_id: "eu1".to_string(),
        coin_symbol: coin.to_string(),
        workerfull: format!("wallet{}.rig{}", i % 3, i % 5),
        share_date: chrono::Utc::now().timestamp_millis(),
        difficulty: "0.0026".to_string(),
        sharedif: "1.5".to_string(),
        nonce: format!("{:016x}", i),
        miner_ip: "10.0.0.1".to_string(),
        reward_method: "PPLNS".to_string(),
        cost: "0".to_string(),
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let pool = connection::establish_connection(&ReferenceSettings {
        database_url: "sqlite::memory:".to_string(),
        max_connections: 1,
        seed_coins: vec!["ALPH".to_string(), "KAS".to_string()],
    })
    .await?;
    info!("✅ Reference database ready");

    let store = Arc::new(SqlReferenceStore::new(pool));
    let app_cache = cache::init_cache(&CacheSettings {
        coin_capacity: 100,
        miner_max_bytes: 1 << 20,
        ttl: None,
    });
    let normalizer = Arc::new(ShareNormalizer::new(
        Arc::new(app_cache.coin_cache.clone()),
        store.clone(),
        Arc::new(app_cache.miner_cache.clone()),
        store.clone(),
        ".",
    ));

    let sink = Arc::new(MemorySink::new());
    let dead_letters = Arc::new(MemoryDeadLetters::new());
    let ctx = PipelineContext {
        normalizer,
        sink: sink.clone(),
        dead_letters: dead_letters.clone(),
        settings: ConsumerSettings {
            batch_size: 10,
            flush_interval: Duration::from_millis(200),
            retry_delay: Duration::from_millis(50),
            invalid_share_policy: InvalidSharePolicy::DeadLetter,
        },
    };

    let topic = MemoryTopic::new("shares", 2);
    for i in 0..25 {
        let coin = if i % 2 == 0 { "ALPH" } else { "KAS" };
        topic.publish_json((i % 2) as i32, &share(i, coin))?;
    }
    topic.publish(0, b"not json".to_vec())?;
    topic.publish_json(1, &share(99, "DOGE"))?;
    topic.close();
    info!("✅ Published 27 messages");

    let readers: Vec<Box<dyn PartitionReader>> = topic
        .readers()
        .into_iter()
        .map(|reader| Box::new(reader) as Box<dyn PartitionReader>)
        .collect();
    let stats = run_partitions(readers, ctx, CancellationToken::new()).await;
    let total = total_stats(&stats);
    info!("Consumer totals: {:?}", total);

    let shares = sink.shares().await;
    assert_eq!(shares.len(), 25, "every valid share should be stored");
    assert!(shares.iter().all(|s| s.coin_id > 0 && s.wallet_id > 0 && s.worker_id > 0));
    assert_eq!(dead_letters.letters().await.len(), 2, "bad payload and unknown coin are dead-lettered");
    assert_eq!(topic.committed_offset(0)?, 14);
    assert_eq!(topic.committed_offset(1)?, 13);
    info!("✅ {} shares stored in {} batches", shares.len(), sink.batch_count());

    let wallets: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM wallets").fetch_one(store.pool()).await?;
    let workers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workers").fetch_one(store.pool()).await?;
    info!("✅ Reference data: {} wallets, {} workers", wallets, workers);

    info!("All smoke checks passed!");
    Ok(())
}
