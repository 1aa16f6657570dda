use chain_scanner::utils::{config::AppConfig, log::Logger};
use chain_scanner::{drain_results, ScanScheduler, TransferBundle};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let config = AppConfig::new()?;

    let _log_guard = Logger::init(&config.log)?;

    info!("Logger initialized");
    info!("Starting chain scanner...");

    let scan_configs = config.scan_configs()?;
    for cfg in &scan_configs {
        info!(
            chain = %cfg.chain,
            confirmations = cfg.confirmations,
            contracts = cfg.contracts.len(),
            "chain configured"
        );
    }

    let (scheduler, mut results) = ScanScheduler::new(
        config.scheduler.shards,
        config.scheduler.queue_capacity,
        None,
        &scan_configs,
    )?;
    info!(
        chains = scan_configs.len(),
        shards = scheduler.shard_count(),
        "scheduler ready"
    );
    let scheduler = Arc::new(scheduler);
    let cancel = CancellationToken::new();

    let driver = {
        let scheduler = Arc::clone(&scheduler);
        let cancel = cancel.clone();
        let interval = config.scheduler.interval();
        tokio::spawn(async move { scheduler.run(interval, cancel).await })
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                cancel.cancel();
                break;
            }
            batch = results.recv() => match batch {
                Some(batch) => publish(&batch),
                None => break,
            },
        }
    }

    driver.await?;
    // In-flight shard runs keep their senders until they finish.
    drop(scheduler);
    let drained = drain_results(&mut results, SHUTDOWN_DRAIN_TIMEOUT, |batch| publish(&batch)).await;
    info!(drained, "Chain scanner stopped");
    Ok(())
}

fn publish(batch: &[TransferBundle]) {
    for bundle in batch {
        match serde_json::to_string(bundle) {
            Ok(line) => println!("{}", line),
            Err(e) => error!(tx = %bundle.tx_id, error = %e, "failed to encode bundle"),
        }
    }
}
