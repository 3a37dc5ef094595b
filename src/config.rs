// Configuration for:
// - batch size / flush interval of the share consumer
// - queue connection (brokers, group, topic, partitions)
// - reference database
// - identifier cache sizing
// - ClickHouse time-series store

use dotenv::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::pipeline::names::DEFAULT_WORKER_SEPARATOR;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// What to do with an event that can never be normalized (undecodable
/// payload, unknown coin...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidSharePolicy {
    /// Abort the whole batch; the event is redelivered until fixed upstream.
    Abort,
    /// Hand the event to the dead-letter sink and flush the rest of the batch.
    DeadLetter,
}

impl FromStr for InvalidSharePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "dead_letter" | "dead-letter" => Ok(Self::DeadLetter),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub retry_delay: Duration,
    pub invalid_share_policy: InvalidSharePolicy,
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub brokers: Vec<String>,
    pub consumer_group: String,
    pub topic: String,
    pub auto_commit_enabled: bool,
    pub partitions: usize,
}

#[derive(Debug, Clone)]
pub struct ReferenceSettings {
    pub database_url: String,
    pub max_connections: u32,
    pub seed_coins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub coin_capacity: u64,
    pub miner_max_bytes: u64,
    pub ttl: Option<Duration>,
}

#[derive(Clone)]
pub struct ClickhouseSettings {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub table: String,
}

impl std::fmt::Debug for ClickhouseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickhouseSettings")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .field("table", &self.table)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub consumer: ConsumerSettings,
    pub queue: QueueSettings,
    pub reference: ReferenceSettings,
    pub cache: CacheSettings,
    pub clickhouse: ClickhouseSettings,
    pub worker_separator: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; missing keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let policy_raw = get("INVALID_SHARE_POLICY", "abort");
        let invalid_share_policy = policy_raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: "INVALID_SHARE_POLICY",
            value: policy_raw.clone(),
        })?;

        let consumer = ConsumerSettings {
            batch_size: parse(&lookup, "BATCH_SIZE", 100)?,
            flush_interval: Duration::from_secs(parse(&lookup, "FLUSH_INTERVAL_SECS", 5)?),
            retry_delay: Duration::from_millis(parse(&lookup, "FLUSH_RETRY_DELAY_MS", 1000)?),
            invalid_share_policy,
        };

        let queue = QueueSettings {
            brokers: split_list(&get("KAFKA_BROKERS", "localhost:9092")),
            consumer_group: get("KAFKA_CONSUMER_GROUP", "sharesGroup"),
            topic: get("KAFKA_TOPIC", "shares"),
            auto_commit_enabled: parse(&lookup, "KAFKA_AUTO_COMMIT", false)?,
            partitions: parse(&lookup, "QUEUE_PARTITIONS", num_cpus::get())?,
        };

        let reference = ReferenceSettings {
            database_url: get("DATABASE_URL", "sqlite:reference.db"),
            max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            seed_coins: split_list(&get("SEED_COINS", "ALPH,KAS")),
        };

        let ttl_secs: Option<u64> = match lookup("CACHE_TTL_SECS") {
            Some(raw) => Some(raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "CACHE_TTL_SECS",
                value: raw.clone(),
            })?),
            None => None,
        };

        let cache = CacheSettings {
            coin_capacity: parse(&lookup, "COIN_CACHE_CAPACITY", 10_000)?,
            miner_max_bytes: parse(&lookup, "MINER_CACHE_MAX_BYTES", 1 << 30)?,
            ttl: ttl_secs.map(Duration::from_secs),
        };

        let clickhouse = ClickhouseSettings {
            url: get("CLICKHOUSE_URL", "http://localhost:8123"),
            database: get("CLICKHOUSE_DATABASE", "default"),
            username: get("CLICKHOUSE_USER", "default"),
            password: get("CLICKHOUSE_PASSWORD", ""),
            table: get("CLICKHOUSE_TABLE", "shares"),
        };

        let config = Self {
            consumer,
            queue,
            reference,
            cache,
            clickhouse,
            worker_separator: get("WORKER_SEPARATOR", DEFAULT_WORKER_SEPARATOR),
        };
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.consumer.batch_size == 0 {
            return Err(ConfigError::Invalid("batch size must be greater than 0".to_string()));
        }
        if self.consumer.flush_interval.is_zero() {
            return Err(ConfigError::Invalid("flush interval must be greater than 0".to_string()));
        }
        if self.queue.partitions == 0 {
            return Err(ConfigError::Invalid("at least one queue partition is required".to_string()));
        }
        if self.queue.topic.trim().is_empty() {
            return Err(ConfigError::Invalid("queue topic must not be empty".to_string()));
        }
        if self.worker_separator.is_empty() {
            return Err(ConfigError::Invalid("worker separator must not be empty".to_string()));
        }
        if self.reference.max_connections == 0 {
            return Err(ConfigError::Invalid("database pool needs at least one connection".to_string()));
        }
        Ok(())
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw.clone() }),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
