//! Configuration
//!
//! Everything the ingestor consumes from outside: node endpoints, monitored
//! contracts, seeded pools and the discovery, transport and re-subscription
//! settings. Loaded from JSON; all sections but `nodeUrl` have defaults.

use std::path::Path;
use std::time::Duration;

use alloy::primitives::{address, Address, B256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signatures::{V3_POOL_CREATED, V3_SWAP};
use crate::types::{ContractConfig, EventConfig};

/// Uniswap V3 factory on Ethereum mainnet
pub const DEFAULT_FACTORY_ADDRESS: Address = address!("1F98431c8aD98523631AE4a59f267346ea31F984");

/// Default streaming connection timeout
pub const CONNECTION_TIMEOUT_MS: u64 = 5000;

/// Default polling interval when streaming is unavailable
pub const POLL_INTERVAL_MS: u64 = 2000;

/// Default widest block window fetched by one `eth_getLogs` request
pub const MAX_BLOCK_RANGE: u64 = 1000;

/// Initial backoff delay for re-subscription
pub const INITIAL_BACKOFF_MS: u64 = 100;

/// Maximum backoff delay for re-subscription
pub const MAX_BACKOFF_MS: u64 = 30000;

/// Errors that can occur loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Node URL cannot be empty")]
    MissingNodeUrl,

    #[error("Contract {contract}: fromBlock {from} is after toBlock {to}")]
    InvertedBlockRange { contract: String, from: u64, to: u64 },

    #[error("Contract {contract}: event {event} has a zero signature")]
    MissingSignature { contract: String, event: String },

    #[error("Contract {contract}: event {event} has {count} extra topics, at most 3 allowed")]
    TooManyTopics { contract: String, event: String, count: usize },
}

/// Timeouts and intervals of the node transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    /// How long to wait for the streaming endpoint before falling back
    pub connect_timeout_ms: u64,
    /// Polling interval used without a streaming connection
    pub poll_interval_ms: u64,
    /// Most blocks covered by a single log query while catching up
    pub max_block_range: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: CONNECTION_TIMEOUT_MS,
            poll_interval_ms: POLL_INTERVAL_MS,
            max_block_range: MAX_BLOCK_RANGE,
        }
    }
}

impl TransportSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn max_block_range(&self) -> u64 {
        self.max_block_range.max(1)
    }
}

/// Opt-in re-subscription of dead subscriptions.
///
/// With `max_attempts` at 0 a subscription whose stream fails stays dead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResubscribePolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ResubscribePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
        }
    }
}

impl ResubscribePolicy {
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Calculate backoff delay for a given attempt number
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_backoff_ms.saturating_mul(2u64.pow(attempt.min(10)));
        Duration::from_millis(delay_ms.min(self.max_backoff_ms))
    }
}

/// A pool to monitor from startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSeed {
    pub name: String,
    pub address: Address,
}

/// Factory watch for newly created pools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    pub factory_address: Address,
    /// Topic-0 of the factory's creation event
    pub pool_created_signature: B256,
    /// Event subscribed on every discovered pool
    pub pool_event: EventConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            factory_address: DEFAULT_FACTORY_ADDRESS,
            pool_created_signature: V3_POOL_CREATED,
            pool_event: EventConfig::new("Swap", V3_SWAP),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestorConfig {
    /// Request/response endpoint (HTTP, WebSocket or IPC)
    pub node_url: String,
    /// Streaming endpoint; absent or empty disables block streaming
    #[serde(default)]
    pub streaming_url: Option<String>,
    #[serde(default)]
    pub contracts: Vec<ContractConfig>,
    #[serde(default)]
    pub pools: Vec<PoolSeed>,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub transport: TransportSettings,
    #[serde(default)]
    pub resubscribe: ResubscribePolicy,
}

impl IngestorConfig {
    pub fn new(node_url: impl Into<String>) -> Self {
        Self {
            node_url: node_url.into(),
            streaming_url: None,
            contracts: Vec::new(),
            pools: Vec::new(),
            discovery: DiscoveryConfig::default(),
            transport: TransportSettings::default(),
            resubscribe: ResubscribePolicy::default(),
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Streaming endpoint, `None` when absent or blank
    pub fn streaming_endpoint(&self) -> Option<&str> {
        self.streaming_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Check invariants serde cannot express.
    ///
    /// Disabled events and contracts without events are valid; they simply
    /// produce no subscriptions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_url.trim().is_empty() {
            return Err(ConfigError::MissingNodeUrl);
        }

        for contract in &self.contracts {
            if let Some(range) = contract.block_range {
                if let (Some(from), Some(to)) = (range.from_block, range.to_block) {
                    if from > to {
                        return Err(ConfigError::InvertedBlockRange {
                            contract: contract.name.clone(),
                            from,
                            to,
                        });
                    }
                }
            }

            for event in &contract.events {
                if event.signature == B256::ZERO {
                    return Err(ConfigError::MissingSignature {
                        contract: contract.name.clone(),
                        event: event.name.clone(),
                    });
                }
                if event.topics.len() > 3 {
                    return Err(ConfigError::TooManyTopics {
                        contract: contract.name.clone(),
                        event: event.name.clone(),
                        count: event.topics.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::ERC20_TRANSFER;
    use crate::types::BlockRange;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "nodeUrl": "http://localhost:8545",
        "streamingUrl": "ws://localhost:8546",
        "contracts": [
            {
                "name": "USDC",
                "address": "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
                "events": [
                    {
                        "name": "Transfer",
                        "signature": "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
                    }
                ],
                "blockRange": { "fromBlock": 19000000 }
            }
        ],
        "pools": [
            { "name": "USDC/WETH", "address": "0x88e6A0c2dDD26FEEb64F039a2c41296FcB3f5640" }
        ],
        "transport": { "maxBlockRange": 500 },
        "resubscribe": { "maxAttempts": 3 }
    }"#;

    // ==================== Parsing tests ====================

    #[test]
    fn test_parse_sample() {
        let config = IngestorConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.node_url, "http://localhost:8545");
        assert_eq!(config.streaming_endpoint(), Some("ws://localhost:8546"));
        assert_eq!(config.contracts.len(), 1);
        assert_eq!(config.contracts[0].events[0].signature, ERC20_TRANSFER);
        assert!(config.contracts[0].events[0].enabled);
        assert_eq!(
            config.contracts[0].block_range,
            Some(BlockRange::new(Some(19_000_000), None))
        );
        assert_eq!(config.pools[0].name, "USDC/WETH");
        assert_eq!(config.transport.max_block_range(), 500);
        assert_eq!(config.transport.poll_interval_ms, POLL_INTERVAL_MS);
        assert_eq!(config.resubscribe.max_attempts, 3);
        assert_eq!(config.resubscribe.initial_backoff_ms, INITIAL_BACKOFF_MS);
    }

    #[test]
    fn test_defaults() {
        let config = IngestorConfig::from_json(r#"{"nodeUrl": "http://localhost:8545"}"#).unwrap();
        assert_eq!(config.streaming_endpoint(), None);
        assert!(config.discovery.enabled);
        assert_eq!(config.discovery.factory_address, DEFAULT_FACTORY_ADDRESS);
        assert_eq!(config.discovery.pool_created_signature, V3_POOL_CREATED);
        assert_eq!(config.discovery.pool_event.signature, V3_SWAP);
        assert_eq!(config.transport, TransportSettings::default());
        assert_eq!(config.transport.max_block_range(), MAX_BLOCK_RANGE);
        assert_eq!(config.resubscribe.max_attempts, 0);
    }

    #[test]
    fn test_blank_streaming_url_is_absent() {
        let mut config = IngestorConfig::new("http://localhost:8545");
        config.streaming_url = Some("   ".to_string());
        assert_eq!(config.streaming_endpoint(), None);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = IngestorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.contracts[0].name, "USDC");
    }

    #[test]
    fn test_missing_file() {
        let result = IngestorConfig::from_file("/nonexistent/ingestor.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    // ==================== Validation tests ====================

    #[test]
    fn test_invalid_address_is_rejected() {
        let json = r#"{"nodeUrl": "http://x", "contracts": [{"name": "Bad", "address": "0x1234"}]}"#;
        assert!(matches!(IngestorConfig::from_json(json), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_inverted_block_range_is_rejected() {
        let mut config = IngestorConfig::new("http://localhost:8545");
        config.contracts.push(
            ContractConfig::new("Token", Address::ZERO, vec![])
                .with_block_range(BlockRange::new(Some(10), Some(5))),
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedBlockRange { from: 10, to: 5, .. })
        ));
    }

    #[test]
    fn test_empty_node_url_is_rejected() {
        assert!(matches!(
            IngestorConfig::new(" ").validate(),
            Err(ConfigError::MissingNodeUrl)
        ));
    }

    #[test]
    fn test_disabled_and_empty_events_are_valid() {
        let mut config = IngestorConfig::new("http://localhost:8545");
        config.contracts.push(ContractConfig::new("Empty", Address::ZERO, vec![]));
        config.contracts.push(ContractConfig::new(
            "Muted",
            Address::repeat_byte(1),
            vec![EventConfig::new("Transfer", ERC20_TRANSFER).disabled()],
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_too_many_topics_is_rejected() {
        let mut config = IngestorConfig::new("http://localhost:8545");
        config.contracts.push(ContractConfig::new(
            "Token",
            Address::ZERO,
            vec![EventConfig::new("Transfer", ERC20_TRANSFER).with_topics(vec![B256::ZERO; 4])],
        ));
        assert!(matches!(config.validate(), Err(ConfigError::TooManyTopics { count: 4, .. })));
    }

    // ==================== Backoff tests ====================

    #[test]
    fn test_backoff_delay() {
        let policy = ResubscribePolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(800));
    }

    #[test]
    fn test_backoff_delay_caps_at_max() {
        let policy = ResubscribePolicy {
            max_backoff_ms: 1000,
            ..Default::default()
        };
        assert_eq!(policy.backoff_delay(10), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(20), Duration::from_millis(1000));
    }
}
