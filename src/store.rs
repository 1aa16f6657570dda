use crate::models::ChainKind;
use crate::utils::error::AppError;
use async_trait::async_trait;
use dashmap::DashMap;

/// Durable key to height mapping used for shard checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Stored height, or 0 when the key has never been written.
    async fn get(&self, key: &str) -> u64;
    async fn save(&self, key: &str, height: u64) -> Result<(), AppError>;
}

pub fn checkpoint_key(chain: ChainKind, shard: u64) -> String {
    format!("{}:scan:shard:{}:checkpoint", chain.name(), shard)
}

/// Process-local store used when no durable one is supplied.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    heights: DashMap<String, u64>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, key: &str) -> u64 {
        self.heights.get(key).map(|h| *h).unwrap_or(0)
    }

    async fn save(&self, key: &str, height: u64) -> Result<(), AppError> {
        self.heights.insert(key.to_string(), height);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format() {
        assert_eq!(checkpoint_key(ChainKind::Tron, 3), "Tron:scan:shard:3:checkpoint");
        assert_eq!(checkpoint_key(ChainKind::Eth, 0), "ETH:scan:shard:0:checkpoint");
    }

    #[tokio::test]
    async fn memory_store_defaults_to_zero() {
        let store = MemoryCheckpointStore::new();
        let key = checkpoint_key(ChainKind::Bsc, 1);
        assert_eq!(store.get(&key).await, 0);
        store.save(&key, 120).await.unwrap();
        assert_eq!(store.get(&key).await, 120);
        assert_eq!(store.get(&checkpoint_key(ChainKind::Bsc, 2)).await, 0);
    }
}
