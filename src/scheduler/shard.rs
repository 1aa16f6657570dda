use crate::models::{ChainKind, TransferBundle};
use crate::scanners::BlockchainScanner;
use crate::store::{checkpoint_key, CheckpointStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// Checkpoint written on first run: just below the first confirmed height.
pub fn bootstrap_checkpoint(head: u64, confirmations: u64) -> u64 {
    head.saturating_sub(confirmations).saturating_sub(1)
}

/// Smallest height above `checkpoint` that belongs to shard `index`.
pub fn first_height(checkpoint: u64, shard_count: u64, index: u64) -> u64 {
    let start = checkpoint + 1;
    let rem = start % shard_count;
    start + (index + shard_count - rem) % shard_count
}

pub fn is_confirmed(head: u64, height: u64, confirmations: u64) -> bool {
    height <= head && head - height >= confirmations
}

/// How a single `run_once` invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardRun {
    /// A previous invocation still holds the guard.
    Busy,
    /// Reached a height without enough confirmations.
    Waiting { next_height: u64 },
    ScanFailed { height: u64 },
    SaveFailed { height: u64 },
    /// The result receiver is gone.
    SinkClosed { height: u64 },
}

/// Scans every height `h` with `h % shard_count == index`, in order.
pub struct ShardWorker {
    chain: ChainKind,
    index: u64,
    shard_count: u64,
    confirmations: u64,
    key: String,
    scanner: Arc<dyn BlockchainScanner>,
    store: Arc<dyn CheckpointStore>,
    results: mpsc::Sender<Vec<TransferBundle>>,
    running: Mutex<()>,
    last_head: AtomicU64,
}

impl ShardWorker {
    pub fn new(
        index: u64,
        shard_count: u64,
        confirmations: u64,
        scanner: Arc<dyn BlockchainScanner>,
        store: Arc<dyn CheckpointStore>,
        results: mpsc::Sender<Vec<TransferBundle>>,
    ) -> Self {
        let chain = scanner.chain();
        ShardWorker {
            chain,
            index,
            shard_count: shard_count.max(1),
            confirmations,
            key: checkpoint_key(chain, index),
            scanner,
            store,
            results,
            running: Mutex::new(()),
            last_head: AtomicU64::new(0),
        }
    }

    pub fn checkpoint_key(&self) -> &str {
        &self.key
    }

    /// Head height passed to the most recent invocation that got to run.
    pub fn last_head(&self) -> u64 {
        self.last_head.load(Ordering::Relaxed)
    }

    pub async fn run_once(&self, head: u64) -> ShardRun {
        let _guard = match self.running.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(chain = %self.chain, shard = self.index, "shard still running, skipping tick");
                return ShardRun::Busy;
            }
        };
        self.last_head.store(head, Ordering::Relaxed);

        let mut checkpoint = self.store.get(&self.key).await;
        if checkpoint == 0 {
            checkpoint = bootstrap_checkpoint(head, self.confirmations);
            if let Err(e) = self.store.save(&self.key, checkpoint).await {
                error!(
                    chain = %self.chain,
                    shard = self.index,
                    checkpoint,
                    error = %e,
                    "init checkpoint save failed"
                );
                return ShardRun::SaveFailed { height: checkpoint };
            }
            info!(chain = %self.chain, shard = self.index, checkpoint, "checkpoint initialized");
        }

        let started = Instant::now();
        let mut height = first_height(checkpoint, self.shard_count, self.index);
        loop {
            if !is_confirmed(head, height, self.confirmations) {
                return ShardRun::Waiting {
                    next_height: height,
                };
            }

            let bundles = match self.scanner.scan_block(height).await {
                Ok(bundles) => bundles,
                Err(e) => {
                    error!(
                        chain = %self.chain,
                        shard = self.index,
                        block = height,
                        error = %e,
                        "scan block failed"
                    );
                    return ShardRun::ScanFailed { height };
                }
            };

            if !bundles.is_empty() {
                info!(
                    chain = %self.chain,
                    shard = self.index,
                    block = height,
                    count = bundles.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "dispatch"
                );
                if self.results.send(bundles).await.is_err() {
                    warn!(chain = %self.chain, shard = self.index, block = height, "result receiver closed");
                    return ShardRun::SinkClosed { height };
                }
            }

            if let Err(e) = self.store.save(&self.key, height).await {
                error!(
                    chain = %self.chain,
                    shard = self.index,
                    block = height,
                    error = %e,
                    "checkpoint save failed"
                );
                return ShardRun::SaveFailed { height };
            }
            debug!(chain = %self.chain, shard = self.index, block = height, "block done");

            height += self.shard_count;
        }
    }
}
