pub mod shard;

use crate::models::{ChainKind, ChainScanConfig, MonitoredContract, TransferBundle};
use crate::scanners::{build_scanner, BlockchainScanner};
use crate::store::{CheckpointStore, MemoryCheckpointStore};
use crate::utils::error::AppError;
use futures::future::join_all;
use shard::{ShardRun, ShardWorker};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub type ResultReceiver = mpsc::Receiver<Vec<TransferBundle>>;

/// Hands every batch still queued or in flight to `publish` until all senders
/// are gone or `timeout` elapses. Returns the number of batches drained.
pub async fn drain_results<F>(results: &mut ResultReceiver, timeout: Duration, mut publish: F) -> usize
where
    F: FnMut(Vec<TransferBundle>),
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut drained = 0;
    loop {
        match tokio::time::timeout_at(deadline, results.recv()).await {
            Ok(Some(batch)) => {
                drained += 1;
                publish(batch);
            }
            Ok(None) => break,
            Err(_) => {
                warn!(drained, "result drain timed out");
                break;
            }
        }
    }
    drained
}

struct ChainTask {
    scanner: Arc<dyn BlockchainScanner>,
    shards: Vec<Arc<ShardWorker>>,
}

/// Drives every configured chain: one head fetch per tick, then one
/// concurrent `run_once` per shard.
pub struct ScanScheduler {
    chains: Vec<ChainTask>,
    shard_count: u64,
}

impl ScanScheduler {
    /// Builds adapters for `configs`. Without a `store`, checkpoints live in
    /// process memory only.
    pub fn new(
        shard_count: u64,
        queue_capacity: usize,
        store: Option<Arc<dyn CheckpointStore>>,
        configs: &[ChainScanConfig],
    ) -> Result<(Self, ResultReceiver), AppError> {
        let chains = configs
            .iter()
            .map(|cfg| Ok((build_scanner(cfg)?, cfg.confirmations)))
            .collect::<Result<Vec<_>, AppError>>()?;
        Self::with_scanners(shard_count, queue_capacity, store, chains)
    }

    /// Same as `new` but with prebuilt adapters and their confirmation depth.
    pub fn with_scanners(
        shard_count: u64,
        queue_capacity: usize,
        store: Option<Arc<dyn CheckpointStore>>,
        scanners: Vec<(Arc<dyn BlockchainScanner>, u64)>,
    ) -> Result<(Self, ResultReceiver), AppError> {
        let shard_count = shard_count.max(1);
        let store: Arc<dyn CheckpointStore> =
            store.unwrap_or_else(|| Arc::new(MemoryCheckpointStore::new()));
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));

        let mut chains: Vec<ChainTask> = Vec::with_capacity(scanners.len());
        for (scanner, confirmations) in scanners {
            let chain = scanner.chain();
            if !chain.is_valid() {
                return Err(AppError::InvalidChain(chain.name().to_string()));
            }
            if chains.iter().any(|c| c.scanner.chain() == chain) {
                return Err(AppError::InvalidChain(format!("{} configured twice", chain)));
            }
            let shards = (0..shard_count)
                .map(|index| {
                    Arc::new(ShardWorker::new(
                        index,
                        shard_count,
                        confirmations,
                        Arc::clone(&scanner),
                        Arc::clone(&store),
                        tx.clone(),
                    ))
                })
                .collect();
            chains.push(ChainTask { scanner, shards });
        }

        Ok((
            ScanScheduler {
                chains,
                shard_count,
            },
            rx,
        ))
    }

    pub fn shard_count(&self) -> u64 {
        self.shard_count
    }

    pub fn chains(&self) -> Vec<ChainKind> {
        self.chains.iter().map(|c| c.scanner.chain()).collect()
    }

    pub fn shard(&self, chain: ChainKind, index: u64) -> Option<Arc<ShardWorker>> {
        self.chains
            .iter()
            .find(|c| c.scanner.chain() == chain)
            .and_then(|c| c.shards.get(index as usize).cloned())
    }

    /// Registers more contracts on a running chain. Unknown chains are ignored.
    pub fn add_contracts(&self, chain: ChainKind, contracts: &[MonitoredContract]) {
        if let Some(task) = self.chains.iter().find(|c| c.scanner.chain() == chain) {
            task.scanner.add_contracts(contracts);
        }
    }

    /// One scan pass. Shard tasks are spawned and left running; the handles
    /// are returned for callers that want to wait on them.
    pub async fn process(&self) -> Vec<JoinHandle<ShardRun>> {
        let heads = join_all(self.chains.iter().map(|c| c.scanner.get_latest_block())).await;

        let mut handles = Vec::new();
        for (task, head) in self.chains.iter().zip(heads) {
            let head = match head {
                Ok(head) => head,
                Err(e) => {
                    error!(chain = %task.scanner.chain(), error = %e, "get head failed");
                    continue;
                }
            };
            for shard in &task.shards {
                let shard = Arc::clone(shard);
                handles.push(tokio::spawn(async move { shard.run_once(head).await }));
            }
        }
        handles
    }

    /// Ticks every `interval` until `cancel` fires. In-flight shard runs are
    /// not interrupted.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        info!(
            chains = self.chains.len(),
            shards = self.shard_count,
            interval_ms = interval.as_millis() as u64,
            "scan driver started"
        );
        while !cancel.is_cancelled() {
            self.process().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("scan driver stopped");
    }
}
