pub mod evm;
pub mod tron;

use crate::models::{ChainKind, ChainScanConfig, MonitoredContract, TransferBundle};
use crate::utils::error::AppError;
use async_trait::async_trait;
use std::sync::Arc;

/// Canonical ERC20/TRC20 `Transfer(address,address,uint256)` topic.
pub const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Per-chain protocol adapter driven by the shard workers.
#[async_trait]
pub trait BlockchainScanner: Send + Sync {
    fn chain(&self) -> ChainKind;

    async fn get_latest_block(&self) -> Result<u64, AppError>;

    /// Transfers touching monitored contracts (and native transfers) at `block_num`.
    async fn scan_block(&self, block_num: u64) -> Result<Vec<TransferBundle>, AppError>;

    fn add_contracts(&self, contracts: &[MonitoredContract]);
}

/// Picks the adapter for `cfg.chain`. `Unknown` never yields an adapter.
pub fn build_scanner(cfg: &ChainScanConfig) -> Result<Arc<dyn BlockchainScanner>, AppError> {
    match cfg.chain {
        ChainKind::Eth | ChainKind::Bsc => Ok(Arc::new(evm::EvmScanner::new(cfg)?)),
        ChainKind::Tron => Ok(Arc::new(tron::TronScanner::new(cfg)?)),
        ChainKind::Unknown => Err(AppError::InvalidChain(cfg.chain.name().to_string())),
    }
}
