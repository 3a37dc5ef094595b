// Share events as they arrive from the queue, the normalized records written
// to the time-series store, and the reference entities they point at.

use serde::{Deserialize, Serialize};

/// Share event as published by the pool servers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawShareEvent {
    pub uuid: String,
    #[serde(rename = "blockType")]
    pub block_type: String,
    #[serde(rename = "serverId")]
    pub server_id: String,
    #[serde(rename = "coinSymbol")]
    pub coin_symbol: String,
    /// `<wallet><separator><worker>`
    pub workerfull: String,
    /// Epoch milliseconds.
    #[serde(rename = "shareDate")]
    pub share_date: i64,
    #[serde(rename = "cHrate")]
    pub current_hashrate: i64,
    #[serde(rename = "aHrate")]
    pub average_hashrate: i64,
    pub difficulty: String,
    pub sharedif: String,
    pub nonce: String,
    #[serde(rename = "minerIp")]
    pub miner_ip: String,
    #[serde(rename = "isSolo")]
    pub is_solo: bool,
    #[serde(rename = "rewardMethod")]
    pub reward_method: String,
    pub cost: String,
}

impl RawShareEvent {
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Carries the payload over with the three references still unresolved.
    pub fn to_normalized(&self, coin_id: i64, wallet_id: i64, worker_id: i64) -> NormalizedShare {
        NormalizedShare {
            uuid: self.uuid.clone(),
            server_id: self.server_id.clone(),
            coin_id,
            worker_id,
            wallet_id,
            share_date: self.share_date,
            difficulty: self.difficulty.clone(),
            sharedif: self.sharedif.clone(),
            nonce: self.nonce.clone(),
            is_solo: self.is_solo,
            reward_method: self.reward_method.clone(),
            cost: self.cost.clone(),
        }
    }
}

/// Share with coin, wallet and worker replaced by their canonical IDs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedShare {
    pub uuid: String,
    pub server_id: String,
    pub coin_id: i64,
    pub worker_id: i64,
    pub wallet_id: i64,
    pub share_date: i64,
    pub difficulty: String,
    pub sharedif: String,
    pub nonce: String,
    pub is_solo: bool,
    pub reward_method: String,
    pub cost: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    pub id: i64,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: i64,
    pub coin_id: i64,
    pub name: String,
    pub reward_method: String,
    pub is_solo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: i64,
    pub coin_id: i64,
    pub workerfull: String,
    pub wallet: String,
    pub worker: String,
    pub server_id: String,
    pub ip: String,
    pub reward_method: String,
    pub is_solo: bool,
}

/// Natural key of a wallet: (name, coin, reward method).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WalletKey {
    pub name: String,
    pub coin_id: i64,
    pub reward_method: String,
}

impl WalletKey {
    pub fn new(name: &str, coin_id: i64, reward_method: &str) -> Self {
        Self {
            name: name.to_string(),
            coin_id,
            reward_method: reward_method.to_string(),
        }
    }
}

/// Natural key of a worker: (full name, coin, reward method).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerKey {
    pub workerfull: String,
    pub coin_id: i64,
    pub reward_method: String,
}

impl WorkerKey {
    pub fn new(workerfull: &str, coin_id: i64, reward_method: &str) -> Self {
        Self {
            workerfull: workerfull.to_string(),
            coin_id,
            reward_method: reward_method.to_string(),
        }
    }
}
