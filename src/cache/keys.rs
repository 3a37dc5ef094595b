//! Cache key generation and management

use std::fmt;

use crate::models::{WalletKey, WorkerKey};

/// A structured cache key.
///
/// Each variant keeps its natural-key fields apart, so `("w1", 23)` and
/// `("w12", 3)` never map to the same entry the way a plain concatenation
/// of name, coin ID and reward method would.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Coin ID by ticker symbol
    Coin(String),
    /// Wallet ID by (name, coin ID, reward method)
    Wallet {
        name: String,
        coin_id: i64,
        reward_method: String,
    },
    /// Worker ID by (full worker name, coin ID, reward method)
    Worker {
        workerfull: String,
        coin_id: i64,
        reward_method: String,
    },
}

impl CacheKey {
    pub fn coin(symbol: &str) -> Self {
        Self::Coin(symbol.to_string())
    }

    pub fn wallet(key: &WalletKey) -> Self {
        Self::Wallet {
            name: key.name.clone(),
            coin_id: key.coin_id,
            reward_method: key.reward_method.clone(),
        }
    }

    pub fn worker(key: &WorkerKey) -> Self {
        Self::Worker {
            workerfull: key.workerfull.clone(),
            coin_id: key.coin_id,
            reward_method: key.reward_method.clone(),
        }
    }

    /// Approximate memory cost of an entry, used by the miner cache weigher.
    pub fn weight(&self) -> u32 {
        let text_len = match self {
            Self::Coin(symbol) => symbol.len(),
            Self::Wallet { name, reward_method, .. } => name.len() + reward_method.len(),
            Self::Worker { workerfull, reward_method, .. } => workerfull.len() + reward_method.len(),
        };
        // key text + coin id + cached id
        u32::try_from(text_len + 16).unwrap_or(u32::MAX)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coin(symbol) => write!(f, "coin:{}", symbol),
            Self::Wallet { name, coin_id, reward_method } => {
                write!(f, "wallet:{}:{}:{}", name, coin_id, reward_method)
            }
            Self::Worker { workerfull, coin_id, reward_method } => {
                write!(f, "worker:{}:{}:{}", workerfull, coin_id, reward_method)
            }
        }
    }
}
