pub mod coin;
pub mod connection;
pub mod migration;
pub mod miner;

use sqlx::SqlitePool;

/// sqlx-backed reference store: implements both `CoinStore` and `MinerStore`.
#[derive(Clone)]
pub struct SqlReferenceStore {
    pool: SqlitePool,
}

impl SqlReferenceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

pub const CREATE_COINS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS coins (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL UNIQUE
)"#;

pub const CREATE_WALLETS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS wallets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    coin_id INTEGER NOT NULL REFERENCES coins(id),
    name TEXT NOT NULL,
    is_solo BOOLEAN NOT NULL,
    reward_method TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE (name, coin_id, reward_method)
)"#;

pub const CREATE_WORKERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS workers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    coin_id INTEGER NOT NULL REFERENCES coins(id),
    workerfull TEXT NOT NULL,
    wallet TEXT NOT NULL,
    worker TEXT NOT NULL,
    server_id TEXT NOT NULL,
    ip TEXT NOT NULL,
    is_solo BOOLEAN NOT NULL,
    reward_method TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (workerfull, coin_id, reward_method)
)"#;
