use crate::models::{AssetMovement, ChainKind, ChainScanConfig, MonitoredContract, TransferBundle};
use crate::registry::ContractRegistry;
use crate::scanners::BlockchainScanner;
use crate::utils::amount::{parse_hex_biguint, parse_hex_u64, scale_amount};
use crate::utils::error::AppError;
use crate::utils::http::JsonHttpClient;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// `transfer(address,uint256)` selector.
pub const TRANSFER_SELECTOR: &str = "0xa9059cbb";

/// Selector plus two 32-byte words.
const TRANSFER_INPUT_LEN: usize = TRANSFER_SELECTOR.len() + 64 * 2;

const TX_COUNT_ATTEMPTS: usize = 5;
const TX_COUNT_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct EvmBlock {
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    transactions: Vec<EvmTransaction>,
}

#[derive(Debug, Deserialize)]
struct EvmTransaction {
    #[serde(default)]
    hash: String,
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    input: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvmReceipt {
    #[serde(default)]
    transaction_hash: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    gas_used: Option<String>,
    #[serde(default)]
    effective_gas_price: Option<String>,
}

/// JSON-RPC adapter shared by ETH and BSC.
pub struct EvmScanner {
    chain: ChainKind,
    client: JsonHttpClient,
    registry: ContractRegistry,
    request_id: AtomicU64,
    verify_receipts: bool,
    retry_delay: Duration,
}

impl EvmScanner {
    pub fn new(cfg: &ChainScanConfig) -> Result<Self, AppError> {
        if !cfg.chain.is_evm() {
            return Err(AppError::InvalidChain(cfg.chain.name().to_string()));
        }
        let api_url = cfg
            .rpc
            .first()
            .ok_or_else(|| AppError::ApiError(format!("No RPC url for {}", cfg.chain)))?;

        let scanner = EvmScanner {
            chain: cfg.chain,
            client: JsonHttpClient::new(api_url)?,
            registry: ContractRegistry::new(cfg.chain),
            request_id: AtomicU64::new(0),
            verify_receipts: cfg.verify_receipts,
            retry_delay: TX_COUNT_RETRY_DELAY,
        };
        scanner.registry.register(&cfg.contracts);
        Ok(scanner)
    }

    /// Overrides the pause between transaction-count probes.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn make_request(&self, method: &str, params: Value) -> Result<Value, AppError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut response = self
            .client
            .post(
                "",
                Some(&json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "method": method,
                    "params": params
                })),
            )
            .await?;

        if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
            let error: RpcErrorBody = serde_json::from_value(error.clone())
                .map_err(|e| AppError::JsonParseError(e.to_string()))?;
            if error.code != 0 || !error.message.is_empty() {
                return Err(AppError::RpcError {
                    code: error.code,
                    message: error.message,
                });
            }
        }

        Ok(response
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// `None` while the node does not know the block yet.
    async fn transaction_count(&self, block_num: u64) -> Result<Option<u64>, AppError> {
        let result = self
            .make_request(
                "eth_getBlockTransactionCountByNumber",
                json!([format!("0x{:x}", block_num)]),
            )
            .await?;
        match result.as_str() {
            Some(count) => Ok(Some(parse_hex_u64(count)?)),
            None => Ok(None),
        }
    }

    /// Polls the transaction count until the node reports a non-empty block.
    /// A transport failure on the final attempt is returned as an error.
    async fn has_transactions(&self, block_num: u64) -> Result<bool, AppError> {
        let mut last_err = None;
        for attempt in 1..=TX_COUNT_ATTEMPTS {
            match self.transaction_count(block_num).await {
                Ok(Some(count)) if count > 0 => return Ok(true),
                Ok(_) => last_err = None,
                Err(e) => {
                    debug!(chain = %self.chain, block = block_num, attempt, error = %e, "tx count probe failed");
                    last_err = Some(e);
                }
            }
            if attempt < TX_COUNT_ATTEMPTS {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(false),
        }
    }

    async fn get_block(&self, block_num: u64) -> Result<EvmBlock, AppError> {
        let result = self
            .make_request(
                "eth_getBlockByNumber",
                json!([format!("0x{:x}", block_num), true]),
            )
            .await?;
        if result.is_null() {
            return Err(AppError::ApiError(format!(
                "Block {} not available",
                block_num
            )));
        }
        serde_json::from_value(result).map_err(|e| AppError::JsonParseError(e.to_string()))
    }

    async fn get_receipt(&self, tx_hash: &str) -> Result<Option<EvmReceipt>, AppError> {
        let result = self
            .make_request("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| AppError::JsonParseError(e.to_string()))
    }

    /// Whether `tx_hash` executed successfully according to its receipt.
    pub async fn is_success(&self, tx_hash: &str) -> Result<bool, AppError> {
        let receipt = self.get_receipt(tx_hash).await?;
        match receipt {
            Some(r) if r.transaction_hash.eq_ignore_ascii_case(tx_hash) => {
                Ok(r.status.as_deref() == Some("0x1"))
            }
            _ => Err(AppError::ApiError(format!(
                "Receipt for {} not available, please retry",
                tx_hash
            ))),
        }
    }

    async fn enrich_from_receipts(&self, bundles: &mut [TransferBundle]) {
        for bundle in bundles.iter_mut() {
            let receipt = match self.get_receipt(&bundle.tx_id).await {
                Ok(Some(r)) => r,
                Ok(None) => {
                    warn!(chain = %self.chain, tx = %bundle.tx_id, "receipt not available");
                    continue;
                }
                Err(e) => {
                    warn!(chain = %self.chain, tx = %bundle.tx_id, error = %e, "receipt fetch failed");
                    continue;
                }
            };
            bundle.success = receipt.status.as_deref() == Some("0x1");
            bundle.remark = if bundle.success { "SUCCESS" } else { "FAILED" }.to_string();

            if let (Some(gas_used), Some(price)) = (&receipt.gas_used, &receipt.effective_gas_price) {
                if let (Ok(gas_used), Ok(price)) = (parse_hex_biguint(gas_used), parse_hex_biguint(price)) {
                    bundle.fee_amount_coin =
                        scale_amount(&(gas_used * price), self.chain.native_decimals());
                }
            }
        }
    }

    fn decode_block(&self, block: &EvmBlock, block_num: u64, head: u64) -> Vec<TransferBundle> {
        let transfer_timestamp = parse_hex_u64(&block.timestamp)
            .map(|secs| secs as i64 * 1000)
            .unwrap_or(0);

        block
            .transactions
            .iter()
            .filter_map(|tx| {
                let movement = self.decode_transaction(tx)?;
                let mut bundle = TransferBundle::new(self.chain, block_num, &tx.hash);
                bundle.confirmations = head.saturating_sub(block_num);
                bundle.fee_symbol = self.chain.native_symbol().to_string();
                bundle.transfer_timestamp = transfer_timestamp;
                bundle.transfers.push(movement);
                Some(bundle)
            })
            .collect()
    }

    fn decode_transaction(&self, tx: &EvmTransaction) -> Option<AssetMovement> {
        let to = tx.to.clone().unwrap_or_default();
        if tx.input.is_empty() || tx.input == "0x" {
            let value = match parse_hex_biguint(&tx.value) {
                Ok(v) => v,
                Err(e) => {
                    debug!(chain = %self.chain, tx = %tx.hash, error = %e, "skipping native transfer");
                    return None;
                }
            };
            return Some(AssetMovement {
                from_address: tx.from.clone(),
                to_address: to,
                contract: String::new(),
                symbol: self.chain.native_symbol().to_string(),
                amount: scale_amount(&value, self.chain.native_decimals()),
                log_idx: 0,
            });
        }

        let contract = self.registry.lookup(&to)?;
        if !tx.input.is_ascii() {
            debug!(chain = %self.chain, tx = %tx.hash, "skipping non-hex input");
            return None;
        }
        let input = tx.input.to_ascii_lowercase();
        if input.len() != TRANSFER_INPUT_LEN || !input.starts_with(TRANSFER_SELECTOR) {
            return None;
        }
        let recipient_word = &input[TRANSFER_SELECTOR.len()..TRANSFER_SELECTOR.len() + 64];
        let amount_word = &input[TRANSFER_SELECTOR.len() + 64..];
        let amount = match parse_hex_biguint(amount_word) {
            Ok(v) => v,
            Err(e) => {
                debug!(chain = %self.chain, tx = %tx.hash, error = %e, "skipping token transfer");
                return None;
            }
        };

        Some(AssetMovement {
            from_address: tx.from.clone(),
            to_address: format!("0x{}", recipient_word.trim_start_matches('0')),
            contract: contract.address,
            symbol: contract.symbol,
            amount: scale_amount(&amount, contract.decimals),
            log_idx: 0,
        })
    }
}

#[async_trait]
impl BlockchainScanner for EvmScanner {
    fn chain(&self) -> ChainKind {
        self.chain
    }

    async fn get_latest_block(&self) -> Result<u64, AppError> {
        let result = self.make_request("eth_blockNumber", json!([])).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| AppError::ParseError("Failed to parse block number".to_string()))?;
        parse_hex_u64(hex)
    }

    async fn scan_block(&self, block_num: u64) -> Result<Vec<TransferBundle>, AppError> {
        let head = self.get_latest_block().await?;
        if !self.has_transactions(block_num).await? {
            return Ok(Vec::new());
        }

        let block = self.get_block(block_num).await?;
        let mut bundles = self.decode_block(&block, block_num, head);
        if self.verify_receipts {
            self.enrich_from_receipts(&mut bundles).await;
        }
        Ok(bundles)
    }

    fn add_contracts(&self, contracts: &[MonitoredContract]) {
        self.registry.register(contracts);
    }
}
