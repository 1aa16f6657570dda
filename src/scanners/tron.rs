use crate::models::{AssetMovement, ChainKind, ChainScanConfig, MonitoredContract, TransferBundle};
use crate::registry::ContractRegistry;
use crate::scanners::{BlockchainScanner, TRANSFER_TOPIC};
use crate::utils::amount::{parse_hex_biguint, scale_amount};
use crate::utils::error::AppError;
use crate::utils::http::JsonHttpClient;
use crate::utils::tron::{normalize_tron_address, topic_to_tron_address};
use async_trait::async_trait;
use num_bigint::BigUint;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

// Every call goes through the solidified (finalized) node API.
const GET_SOLID_BLOCK: &str = "walletsolidity/getblock";
const GET_BLOCK_BY_NUM: &str = "walletsolidity/getblockbynum";
const GET_TX_INFO_BY_BLOCK_NUM: &str = "walletsolidity/gettransactioninfobyblocknum";

const API_KEY_HEADER: &str = "TRON-PRO-API-KEY";

const TRANSFER_CONTRACT: &str = "TransferContract";
const TRIGGER_SMART_CONTRACT: &str = "TriggerSmartContract";
const SUCCESS: &str = "SUCCESS";

#[derive(Debug, Default, Deserialize)]
struct TronBlock {
    #[serde(default)]
    block_header: BlockHeader,
    #[serde(default)]
    transactions: Vec<TronTransaction>,
}

#[derive(Debug, Default, Deserialize)]
struct BlockHeader {
    #[serde(default)]
    raw_data: HeaderRawData,
}

#[derive(Debug, Default, Deserialize)]
struct HeaderRawData {
    #[serde(default)]
    number: u64,
    #[serde(default)]
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct TronTransaction {
    #[serde(rename = "txID", default)]
    tx_id: String,
    #[serde(default)]
    ret: Vec<TxRet>,
    #[serde(default)]
    raw_data: TxRawData,
}

#[derive(Debug, Deserialize)]
struct TxRet {
    #[serde(rename = "contractRet", default)]
    contract_ret: String,
}

#[derive(Debug, Default, Deserialize)]
struct TxRawData {
    #[serde(default)]
    contract: Vec<TronContract>,
    #[serde(default)]
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct TronContract {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    parameter: ContractParameter,
}

#[derive(Debug, Default, Deserialize)]
struct ContractParameter {
    #[serde(default)]
    value: ContractValue,
}

#[derive(Debug, Default, Deserialize)]
struct ContractValue {
    #[serde(default)]
    amount: i64,
    #[serde(default)]
    owner_address: String,
    #[serde(default)]
    to_address: String,
    #[serde(default)]
    contract_address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxInfo {
    #[serde(default)]
    id: String,
    #[serde(default)]
    block_number: u64,
    #[serde(default)]
    block_time_stamp: i64,
    #[serde(rename = "contract_address", default)]
    contract_address: String,
    #[serde(default)]
    receipt: TxReceipt,
    #[serde(default)]
    log: Vec<TronLog>,
}

#[derive(Debug, Default, Deserialize)]
struct TxReceipt {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    energy_fee: u64,
    #[serde(default)]
    net_fee: u64,
    #[serde(default)]
    energy_penalty_total: u64,
}

#[derive(Debug, Deserialize)]
struct TronLog {
    #[serde(default)]
    address: String,
    #[serde(default)]
    data: String,
    #[serde(default)]
    topics: Vec<String>,
}

/// Top-level call of a transaction, used to authenticate TRC20 logs.
#[derive(Debug, Default)]
struct TxMeta {
    kind: String,
    top_contract: String,
    owner_address: String,
}

/// Native transfers of one block, in block order, indexed by tx id.
#[derive(Debug, Default)]
struct NativeTransfers {
    bundles: Vec<TransferBundle>,
    by_tx: HashMap<String, usize>,
}

/// The HTTP API reports failures as a 200 with an `Error` field.
fn node_error(body: &Value) -> Result<(), AppError> {
    match body.get("Error") {
        Some(err) => Err(AppError::ApiError(format!(
            "Node error: {}",
            err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string())
        ))),
        None => Ok(()),
    }
}

pub struct TronScanner {
    client: JsonHttpClient,
    registry: ContractRegistry,
}

impl TronScanner {
    pub fn new(cfg: &ChainScanConfig) -> Result<Self, AppError> {
        if cfg.chain != ChainKind::Tron {
            return Err(AppError::InvalidChain(cfg.chain.name().to_string()));
        }
        let api_url = cfg
            .rpc
            .first()
            .ok_or_else(|| AppError::ApiError("No RPC url for Tron".to_string()))?;
        let client = match cfg.rpc.get(1).filter(|key| !key.is_empty()) {
            Some(key) => JsonHttpClient::with_headers(api_url, &[(API_KEY_HEADER, key.as_str())])?,
            None => JsonHttpClient::new(api_url)?,
        };

        let scanner = TronScanner {
            client,
            registry: ContractRegistry::new(ChainKind::Tron),
        };
        scanner.registry.register(&cfg.contracts);
        Ok(scanner)
    }

    /// Sums fee components in sun without overflow and scales to TRX.
    fn fee(parts: &[u64]) -> String {
        let total: BigUint = parts.iter().map(|&sun| BigUint::from(sun)).sum();
        scale_amount(&total, ChainKind::Tron.native_decimals())
    }

    async fn get_block_by_num(&self, block_num: u64) -> Result<TronBlock, AppError> {
        let result = self
            .client
            .post(GET_BLOCK_BY_NUM, Some(&json!({ "num": block_num, "visible": true })))
            .await?;
        node_error(&result)?;
        let block: TronBlock =
            serde_json::from_value(result).map_err(|e| AppError::JsonParseError(e.to_string()))?;
        if block.block_header.raw_data.number != block_num {
            return Err(AppError::ApiError(format!(
                "Block {} not available, node returned {}",
                block_num, block.block_header.raw_data.number
            )));
        }
        Ok(block)
    }

    async fn get_tx_infos(&self, block_num: u64) -> Result<Vec<TxInfo>, AppError> {
        let result = self
            .client
            .post(
                GET_TX_INFO_BY_BLOCK_NUM,
                Some(&json!({ "num": block_num, "visible": true })),
            )
            .await?;
        node_error(&result)?;
        // Empty blocks come back as `{}` rather than `[]`.
        if result.as_object().is_some_and(|obj| obj.is_empty()) {
            return Ok(Vec::new());
        }
        if !result.is_array() {
            return Err(AppError::ParseError(format!(
                "Unexpected transaction info for block {}: {}",
                block_num, result
            )));
        }
        serde_json::from_value(result).map_err(|e| AppError::JsonParseError(e.to_string()))
    }

    /// Records top-level call metadata for every transaction and collects
    /// plain TRX transfers.
    fn decode_block(&self, block: TronBlock, head: u64) -> (NativeTransfers, HashMap<String, TxMeta>) {
        let number = block.block_header.raw_data.number;
        let block_timestamp = block.block_header.raw_data.timestamp;
        let mut natives = NativeTransfers::default();
        let mut metas = HashMap::with_capacity(block.transactions.len());

        for tx in block.transactions {
            let mut meta = TxMeta::default();
            if let Some(top) = tx.raw_data.contract.first() {
                meta.kind = top.kind.clone();
                meta.owner_address = normalize_tron_address(&top.parameter.value.owner_address);
                if top.kind == TRIGGER_SMART_CONTRACT {
                    meta.top_contract = normalize_tron_address(&top.parameter.value.contract_address);
                }
            }
            metas.insert(tx.tx_id.clone(), meta);

            let ret = match tx.ret.first() {
                Some(ret) => ret.contract_ret.clone(),
                None => continue,
            };
            if tx.raw_data.contract.first().map(|c| c.kind.as_str()) != Some(TRANSFER_CONTRACT) {
                continue;
            }

            let mut bundle = TransferBundle::new(ChainKind::Tron, number, &tx.tx_id);
            bundle.confirmations = head.saturating_sub(number);
            bundle.success = ret == SUCCESS;
            bundle.remark = ret;
            bundle.transfer_timestamp = if tx.raw_data.timestamp > 0 {
                tx.raw_data.timestamp
            } else {
                block_timestamp
            };

            for (idx, contract) in tx.raw_data.contract.iter().enumerate() {
                if contract.kind != TRANSFER_CONTRACT {
                    continue;
                }
                let value = &contract.parameter.value;
                if value.owner_address.is_empty() || value.to_address.is_empty() || value.amount <= 0 {
                    continue;
                }
                bundle.transfers.push(AssetMovement {
                    from_address: normalize_tron_address(&value.owner_address),
                    to_address: normalize_tron_address(&value.to_address),
                    contract: String::new(),
                    symbol: ChainKind::Tron.native_symbol().to_string(),
                    amount: scale_amount(
                        &BigUint::from(value.amount as u64),
                        ChainKind::Tron.native_decimals(),
                    ),
                    log_idx: idx,
                });
            }

            if !bundle.transfers.is_empty() {
                natives.by_tx.insert(tx.tx_id, natives.bundles.len());
                natives.bundles.push(bundle);
            }
        }

        (natives, metas)
    }

    /// Attaches fees to native transfers and extracts at most one
    /// authenticated TRC20 transfer per contract call, then merges both.
    fn decode_tx_infos(
        &self,
        infos: Vec<TxInfo>,
        block_num: u64,
        head: u64,
        mut natives: NativeTransfers,
        metas: &HashMap<String, TxMeta>,
    ) -> Vec<TransferBundle> {
        let mut out = Vec::new();

        for info in infos {
            let result = match info.receipt.result.as_deref().filter(|r| !r.is_empty()) {
                Some(result) => result.to_string(),
                None => {
                    if let Some(&idx) = natives.by_tx.get(&info.id) {
                        let receipt = &info.receipt;
                        let bundle = &mut natives.bundles[idx];
                        bundle.fee_symbol = ChainKind::Tron.native_symbol().to_string();
                        bundle.fee_amount_coin = Self::fee(&[
                            receipt.energy_fee,
                            receipt.net_fee,
                            receipt.energy_penalty_total,
                        ]);
                    }
                    continue;
                }
            };

            let number = if info.block_number > 0 { info.block_number } else { block_num };
            let mut bundle = TransferBundle::new(ChainKind::Tron, number, &info.id);
            bundle.confirmations = head.saturating_sub(number);
            bundle.fee_symbol = ChainKind::Tron.native_symbol().to_string();
            bundle.fee_amount_coin = Self::fee(&[info.receipt.energy_fee, info.receipt.net_fee]);
            bundle.transfer_timestamp = info.block_time_stamp;
            bundle.success = result == SUCCESS;
            bundle.remark = result;

            if let Some(movement) = self.first_trc20_transfer(&info, metas.get(&info.id)) {
                bundle.transfers.push(movement);
                out.push(bundle);
            }
        }

        out.extend(natives.bundles);
        out
    }

    fn first_trc20_transfer(&self, info: &TxInfo, meta: Option<&TxMeta>) -> Option<AssetMovement> {
        let meta = meta.filter(|m| m.kind == TRIGGER_SMART_CONTRACT && !m.top_contract.is_empty())?;

        for (idx, log) in info.log.iter().enumerate() {
            if log.topics.len() != 3 {
                continue;
            }
            let topics: Vec<String> = log
                .topics
                .iter()
                .map(|t| {
                    let t = t.to_ascii_lowercase();
                    if t.starts_with("0x") {
                        t
                    } else {
                        format!("0x{}", t)
                    }
                })
                .collect();
            if topics[0] != TRANSFER_TOPIC {
                continue;
            }
            let emitter = if log.address.is_empty() {
                normalize_tron_address(&info.contract_address)
            } else {
                normalize_tron_address(&log.address)
            };
            if emitter != meta.top_contract {
                debug!(
                    tx = %info.id,
                    emitter = %emitter,
                    caller = %meta.owner_address,
                    "transfer log not from top-level call"
                );
                continue;
            }
            if topics.iter().any(|t| t.len() != 66) {
                continue;
            }
            let (from, to) = match (topic_to_tron_address(&topics[1]), topic_to_tron_address(&topics[2])) {
                (Ok(from), Ok(to)) => (from, to),
                _ => continue,
            };
            let value = match parse_hex_biguint(&log.data) {
                Ok(v) => v,
                Err(e) => {
                    debug!(tx = %info.id, error = %e, "bad transfer log data");
                    continue;
                }
            };
            let contract = match self.registry.lookup(&emitter) {
                Some(c) => c,
                None => continue,
            };

            return Some(AssetMovement {
                from_address: from,
                to_address: to,
                contract: contract.address,
                symbol: contract.symbol,
                amount: scale_amount(&value, contract.decimals),
                log_idx: idx,
            });
        }
        None
    }
}

#[async_trait]
impl BlockchainScanner for TronScanner {
    fn chain(&self) -> ChainKind {
        ChainKind::Tron
    }

    async fn get_latest_block(&self) -> Result<u64, AppError> {
        let result = self.client.post::<Value>(GET_SOLID_BLOCK, None).await?;
        let block_number = result["block_header"]["raw_data"]["number"]
            .as_u64()
            .unwrap_or(0);
        if block_number == 0 {
            return Err(AppError::ParseError("Block number is zero".to_string()));
        }
        Ok(block_number)
    }

    async fn scan_block(&self, block_num: u64) -> Result<Vec<TransferBundle>, AppError> {
        let head = self.get_latest_block().await?;
        let block = self.get_block_by_num(block_num).await?;
        let (natives, metas) = self.decode_block(block, head);
        let infos = self.get_tx_infos(block_num).await?;
        Ok(self.decode_tx_infos(infos, block_num, head, natives, &metas))
    }

    fn add_contracts(&self, contracts: &[MonitoredContract]) {
        self.registry.register(contracts);
    }
}
