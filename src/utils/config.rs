use crate::models::{ChainKind, ChainScanConfig, MonitoredContract};
use crate::utils::error::AppError;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_millis")]
    pub interval_millis: u64,
    #[serde(default = "default_shards")]
    pub shards: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_interval_millis() -> u64 {
    2000
}

fn default_shards() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    2000
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_millis)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            interval_millis: default_interval_millis(),
            shards: default_shards(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub output: String,
    pub format: String,
    pub file_path: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractConfig {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain: String,
    #[serde(default)]
    pub confirmations: u64,
    pub rpc: Vec<String>,
    #[serde(default)]
    pub verify_receipts: bool,
    #[serde(default)]
    pub contracts: Vec<ContractConfig>,
}

impl ChainConfig {
    pub fn to_scan_config(&self) -> Result<ChainScanConfig, AppError> {
        let chain = ChainKind::from_name(&self.chain);
        if !chain.is_valid() {
            return Err(AppError::InvalidChain(self.chain.clone()));
        }
        Ok(ChainScanConfig {
            chain,
            confirmations: self.confirmations,
            contracts: self
                .contracts
                .iter()
                .map(|c| MonitoredContract::new(&c.address, &c.symbol, c.decimals))
                .collect(),
            rpc: self.rpc.clone(),
            verify_receipts: self.verify_receipts,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub log: LogConfig,
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(Environment::with_prefix("SCANNER").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn scan_configs(&self) -> Result<Vec<ChainScanConfig>, AppError> {
        self.chains.iter().map(ChainConfig::to_scan_config).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const SAMPLE: &str = r#"
        [log]
        level = "info"
        output = "stdout"
        format = "text"
        file_path = "logs"
        file_name = "scanner.log"

        [scheduler]
        shards = 4

        [[chains]]
        chain = "tron"
        confirmations = 19
        rpc = ["https://api.trongrid.io", "key"]
        contracts = [{ address = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t", symbol = "USDT", decimals = 6 }]

        [[chains]]
        chain = "BSC"
        rpc = ["https://bsc-dataseed.binance.org"]
    "#;

    fn load(text: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn fills_scheduler_defaults() {
        let cfg = load(SAMPLE);
        assert_eq!(cfg.scheduler.shards, 4);
        assert_eq!(cfg.scheduler.interval(), Duration::from_secs(2));
        assert_eq!(cfg.scheduler.queue_capacity, 2000);
    }

    #[test]
    fn converts_chains_to_scan_configs() {
        let scans = load(SAMPLE).scan_configs().unwrap();
        assert_eq!(scans.len(), 2);
        assert_eq!(scans[0].chain, ChainKind::Tron);
        assert_eq!(scans[0].confirmations, 19);
        assert_eq!(scans[0].contracts[0].symbol, "USDT");
        assert_eq!(scans[1].chain, ChainKind::Bsc);
        assert_eq!(scans[1].confirmations, 0);
        assert!(scans[1].contracts.is_empty());
    }

    #[test]
    fn rejects_unknown_chain() {
        let chain = ChainConfig {
            chain: "solana".to_string(),
            confirmations: 0,
            rpc: vec!["http://localhost".to_string()],
            verify_receipts: false,
            contracts: vec![],
        };
        assert!(matches!(
            chain.to_scan_config(),
            Err(AppError::InvalidChain(name)) if name == "solana"
        ));
    }
}
