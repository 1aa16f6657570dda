use crate::models::{ChainKind, MonitoredContract};
use crate::utils::tron::normalize_tron_address;
use dashmap::DashMap;

/// Monitored contracts of one chain, keyed by normalized address.
///
/// Safe to share between the scheduler and every shard worker; writes may
/// land while scans are in flight.
pub struct ContractRegistry {
    chain: ChainKind,
    contracts: DashMap<String, MonitoredContract>,
}

impl ContractRegistry {
    pub fn new(chain: ChainKind) -> Self {
        ContractRegistry {
            chain,
            contracts: DashMap::new(),
        }
    }

    pub fn normalize(&self, address: &str) -> String {
        match self.chain {
            ChainKind::Tron => normalize_tron_address(address),
            _ => address.trim().to_ascii_lowercase(),
        }
    }

    pub fn register(&self, contracts: &[MonitoredContract]) {
        for contract in contracts {
            let mut contract = contract.clone();
            contract.address = self.normalize(&contract.address);
            if contract.address.is_empty() {
                continue;
            }
            self.contracts.insert(contract.address.clone(), contract);
        }
    }

    pub fn lookup(&self, address: &str) -> Option<MonitoredContract> {
        let key = self.normalize(address);
        self.contracts.get(&key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}
