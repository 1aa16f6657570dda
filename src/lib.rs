pub mod models;
pub mod registry;
pub mod scanners;
pub mod scheduler;
pub mod store;
pub mod utils;

pub use models::{AssetMovement, ChainKind, ChainScanConfig, MonitoredContract, TransferBundle};
pub use scanners::BlockchainScanner;
pub use scheduler::{drain_results, ResultReceiver, ScanScheduler};
pub use store::{CheckpointStore, MemoryCheckpointStore};
pub use utils::error::AppError;
