use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainKind {
    Eth,
    Bsc,
    Tron,
    Unknown,
}

impl ChainKind {
    /// Case-insensitive lookup; anything unrecognized is `Unknown`.
    pub fn from_name(name: &str) -> ChainKind {
        match name.trim().to_ascii_lowercase().as_str() {
            "eth" => ChainKind::Eth,
            "bsc" => ChainKind::Bsc,
            "tron" => ChainKind::Tron,
            _ => ChainKind::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChainKind::Eth => "ETH",
            ChainKind::Bsc => "BSC",
            ChainKind::Tron => "Tron",
            ChainKind::Unknown => "Unknown",
        }
    }

    pub fn is_valid(&self) -> bool {
        *self != ChainKind::Unknown
    }

    pub fn is_evm(&self) -> bool {
        matches!(self, ChainKind::Eth | ChainKind::Bsc)
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            ChainKind::Eth => "ETH",
            ChainKind::Bsc => "BNB",
            ChainKind::Tron => "TRX",
            ChainKind::Unknown => "",
        }
    }

    pub fn native_decimals(&self) -> u8 {
        match self {
            ChainKind::Tron => 6,
            _ => 18,
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for ChainKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// A token contract whose transfers are reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredContract {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}

impl MonitoredContract {
    pub fn new(address: &str, symbol: &str, decimals: u8) -> Self {
        MonitoredContract {
            address: address.to_string(),
            symbol: symbol.to_string(),
            decimals,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChainScanConfig {
    pub chain: ChainKind,
    /// Blocks that must sit on top of a height before it is scanned.
    pub confirmations: u64,
    pub contracts: Vec<MonitoredContract>,
    /// Slot 0 is the base URL; later slots are adapter specific.
    pub rpc: Vec<String>,
    /// EVM only: enrich bundles from `eth_getTransactionReceipt`.
    pub verify_receipts: bool,
}

impl ChainScanConfig {
    pub fn new(chain: ChainKind, confirmations: u64, rpc: Vec<String>) -> Self {
        ChainScanConfig {
            chain,
            confirmations,
            contracts: Vec::new(),
            rpc,
            verify_receipts: false,
        }
    }

    pub fn with_contracts(mut self, contracts: Vec<MonitoredContract>) -> Self {
        self.contracts = contracts;
        self
    }
}

/// Everything extracted from one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferBundle {
    pub chain: ChainKind,
    pub block_num: u64,
    pub confirmations: u64,
    #[serde(rename = "result")]
    pub success: bool,
    pub remark: String,
    pub fee_amount_coin: String,
    pub fee_symbol: String,
    pub timestamp: i64,
    pub transfer_timestamp: i64,
    #[serde(rename = "txid")]
    pub tx_id: String,
    pub transfers: Vec<AssetMovement>,
}

impl TransferBundle {
    pub fn new(chain: ChainKind, block_num: u64, tx_id: &str) -> Self {
        TransferBundle {
            chain,
            block_num,
            confirmations: 0,
            success: false,
            remark: String::new(),
            fee_amount_coin: String::new(),
            fee_symbol: String::new(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            transfer_timestamp: 0,
            tx_id: tx_id.to_string(),
            transfers: Vec::new(),
        }
    }
}

/// One value movement inside a transaction. An empty `contract` means the
/// chain's native coin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMovement {
    pub from_address: String,
    pub to_address: String,
    pub contract: String,
    pub symbol: String,
    pub amount: String,
    pub log_idx: usize,
}
