//! Core Data Model
//!
//! Contract/event configuration consumed by the registry, plus the raw log and
//! block shapes produced by the node transport. Raw values are immutable once
//! built; everything downstream only borrows them.

use std::fmt;

use alloy::primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

/// Size of one ABI word in bytes
pub const WORD_SIZE: usize = 32;

/// Maximum number of topics a log can carry (topic-0 plus three indexed params)
pub const MAX_TOPICS: usize = 4;

/// Inclusive block window for a contract's subscriptions.
///
/// Both bounds absent means "from latest, continuous".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRange {
    #[serde(default)]
    pub from_block: Option<u64>,
    #[serde(default)]
    pub to_block: Option<u64>,
}

impl BlockRange {
    pub fn new(from_block: Option<u64>, to_block: Option<u64>) -> Self {
        Self { from_block, to_block }
    }

    /// `fromBlock <= toBlock` whenever both are present
    pub fn is_valid(&self) -> bool {
        match (self.from_block, self.to_block) {
            (Some(from), Some(to)) => from <= to,
            _ => true,
        }
    }
}

/// One event of a contract to subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventConfig {
    /// Human readable event name, e.g. "Swap"
    pub name: String,
    /// Topic-0 hash of the event signature
    pub signature: B256,
    /// Extra indexed-topic filters, ANDed after topic-0 in positions 1..=3
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl EventConfig {
    pub fn new(name: impl Into<String>, signature: B256) -> Self {
        Self {
            name: name.into(),
            signature,
            topics: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_topics(mut self, topics: Vec<B256>) -> Self {
        self.topics = topics;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A monitored contract. Identity is the address alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractConfig {
    pub name: String,
    pub address: Address,
    #[serde(default)]
    pub events: Vec<EventConfig>,
    #[serde(default)]
    pub block_range: Option<BlockRange>,
}

impl ContractConfig {
    pub fn new(name: impl Into<String>, address: Address, events: Vec<EventConfig>) -> Self {
        Self {
            name: name.into(),
            address,
            events,
            block_range: None,
        }
    }

    pub fn with_block_range(mut self, range: BlockRange) -> Self {
        self.block_range = Some(range);
        self
    }

    /// Events that should get a subscription
    pub fn enabled_events(&self) -> impl Iterator<Item = &EventConfig> {
        self.events.iter().filter(|e| e.enabled)
    }

    /// Whether any configured event (enabled or not) uses one of `signatures`
    pub fn declares_any(&self, signatures: &[B256]) -> bool {
        self.events.iter().any(|e| signatures.contains(&e.signature))
    }
}

impl PartialEq for ContractConfig {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for ContractConfig {}

/// A log entry as delivered by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLogEntry {
    pub address: Address,
    /// Up to four topics; topic-0 is the event signature
    pub topics: Vec<B256>,
    /// Non-indexed parameters, ABI encoded
    pub data: Bytes,
    pub transaction_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
    /// Block timestamp in seconds, when the node includes it on the log
    pub block_timestamp: Option<u64>,
}

impl RawLogEntry {
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }
}

/// A block header with its transactions flattened to hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlockHeader {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub gas_limit: u64,
    pub gas_used: u64,
    /// Seconds since the unix epoch
    pub timestamp: u64,
    pub miner: Address,
    pub transactions: Vec<B256>,
}

/// Registry key: one subscription per (contract address, event name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    pub address: Address,
    pub event_name: String,
}

impl SubscriptionKey {
    pub fn new(address: Address, event_name: impl Into<String>) -> Self {
        Self {
            address,
            event_name: event_name.into(),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}_{}", self.address, self.event_name)
    }
}

/// Extract an address from an indexed topic (the low 20 bytes of the word)
pub fn topic_to_address(topic: &B256) -> Address {
    Address::from_word(*topic)
}

/// Left-pad an address into a 32-byte topic word
pub fn address_to_topic(address: Address) -> B256 {
    address.into_word()
}

/// Format an address as lower-case hex with 0x prefix
pub fn format_address(address: Address) -> String {
    format!("{:#x}", address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, b256};

    #[test]
    fn test_topic_to_address_takes_low_20_bytes() {
        let topic = b256!("000000000000000000000000f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        assert_eq!(
            topic_to_address(&topic),
            address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );
    }

    #[test]
    fn test_topic_to_address_ignores_high_bytes() {
        let topic = b256!("ffffffffffffffffffffffffa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
        assert_eq!(
            topic_to_address(&topic),
            address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48")
        );
    }

    #[test]
    fn test_address_formatting_is_lower_case() {
        let addr = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        assert_eq!(format_address(addr), "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
    }

    #[test]
    fn test_address_topic_round_trip() {
        let addr = address!("7a250d5630B4cF539739dF2C5dAcb4c659F2488D");
        assert_eq!(topic_to_address(&address_to_topic(addr)), addr);
    }

    #[test]
    fn test_block_range_validity() {
        assert!(BlockRange::default().is_valid());
        assert!(BlockRange::new(Some(10), None).is_valid());
        assert!(BlockRange::new(Some(10), Some(10)).is_valid());
        assert!(!BlockRange::new(Some(11), Some(10)).is_valid());
    }

    #[test]
    fn test_contract_identity_is_address() {
        let addr = address!("1F98431c8aD98523631AE4a59f267346ea31F984");
        let a = ContractConfig::new("Factory", addr, vec![]);
        let b = ContractConfig::new("Other name", addr, vec![EventConfig::new("X", B256::ZERO)]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_enabled_events_skips_disabled() {
        let contract = ContractConfig::new(
            "Token",
            Address::ZERO,
            vec![
                EventConfig::new("Transfer", B256::ZERO),
                EventConfig::new("Approval", B256::repeat_byte(1)).disabled(),
            ],
        );
        let names: Vec<_> = contract.enabled_events().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Transfer"]);
    }

    #[test]
    fn test_subscription_key_display() {
        let key = SubscriptionKey::new(address!("1F98431c8aD98523631AE4a59f267346ea31F984"), "Swap");
        assert_eq!(key.to_string(), "0x1f98431c8ad98523631ae4a59f267346ea31f984_Swap");
    }

    #[test]
    fn test_subscription_key_is_case_insensitive_on_address() {
        let lower: Address = "0x1f98431c8ad98523631ae4a59f267346ea31f984".parse().unwrap();
        let mixed: Address = "0x1F98431c8aD98523631AE4a59f267346ea31F984".parse().unwrap();
        assert_eq!(SubscriptionKey::new(lower, "Swap"), SubscriptionKey::new(mixed, "Swap"));
    }

    #[test]
    fn test_event_config_deserializes_with_defaults() {
        let json = r#"{"name":"Transfer","signature":"0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"}"#;
        let event: EventConfig = serde_json::from_str(json).unwrap();
        assert!(event.enabled);
        assert!(event.topics.is_empty());
    }
}
