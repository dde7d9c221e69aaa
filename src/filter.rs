//! Log Filtering
//!
//! Builds the node-side log filter for one (contract, event) subscription.
//! The event signature and any configured extra topics are ANDed together;
//! missing block bounds default to "latest", which for a streaming
//! subscription means open-ended.

use std::fmt;

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, B256};
use alloy::rpc::types::Filter;

use crate::types::{BlockRange, ContractConfig, EventConfig, MAX_TOPICS};

/// One end of a block window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlockTag {
    #[default]
    Latest,
    Number(u64),
}

impl BlockTag {
    pub fn from_bound(bound: Option<u64>) -> Self {
        bound.map_or(BlockTag::Latest, BlockTag::Number)
    }
}

impl From<BlockTag> for BlockNumberOrTag {
    fn from(tag: BlockTag) -> Self {
        match tag {
            BlockTag::Latest => BlockNumberOrTag::Latest,
            BlockTag::Number(n) => BlockNumberOrTag::Number(n),
        }
    }
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockTag::Latest => f.write_str("latest"),
            BlockTag::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Transport-neutral log filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    /// Topic-0 (event signature)
    pub signature: B256,
    /// Topics for positions 1..=3, in order
    pub topics: Vec<B256>,
    pub from_block: BlockTag,
    pub to_block: BlockTag,
}

impl LogFilter {
    pub fn new(address: Address, signature: B256) -> Self {
        Self {
            address,
            signature,
            topics: Vec::new(),
            from_block: BlockTag::Latest,
            to_block: BlockTag::Latest,
        }
    }

    /// Filter for one event of a contract
    pub fn for_event(contract: &ContractConfig, event: &EventConfig) -> Self {
        let range = contract.block_range.unwrap_or_default();
        Self::new(contract.address, event.signature)
            .with_topics(event.topics.clone())
            .with_range(range)
    }

    pub fn with_topics(mut self, topics: Vec<B256>) -> Self {
        self.topics = topics;
        self
    }

    pub fn with_range(mut self, range: BlockRange) -> Self {
        self.from_block = BlockTag::from_bound(range.from_block);
        self.to_block = BlockTag::from_bound(range.to_block);
        self
    }

    /// Whether either end of the block window is a fixed block number
    pub fn is_bounded(&self) -> bool {
        matches!(self.from_block, BlockTag::Number(_)) || matches!(self.to_block, BlockTag::Number(_))
    }

    /// Whether a log with these topics from `address` passes the filter
    pub fn matches(&self, address: &Address, topics: &[B256]) -> bool {
        if *address != self.address || topics.first() != Some(&self.signature) {
            return false;
        }
        self.topics
            .iter()
            .enumerate()
            .all(|(i, expected)| topics.get(i + 1) == Some(expected))
    }

    /// Convert into an alloy RPC filter
    pub fn to_rpc(&self) -> Filter {
        let mut filter = Filter::new()
            .address(self.address)
            .event_signature(self.signature)
            .from_block(BlockNumberOrTag::from(self.from_block))
            .to_block(BlockNumberOrTag::from(self.to_block));

        for (i, topic) in self.topics.iter().take(MAX_TOPICS - 1).enumerate() {
            filter = match i {
                0 => filter.topic1(*topic),
                1 => filter.topic2(*topic),
                _ => filter.topic3(*topic),
            };
        }
        filter
    }
}

impl fmt::Display for LogFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#x} topic0={:#x} extra_topics={} blocks={}..{}",
            self.address,
            self.signature,
            self.topics.len(),
            self.from_block,
            self.to_block
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::{ERC20_TRANSFER, V3_POOL_CREATED};
    use alloy::primitives::address;

    const FACTORY: Address = address!("1F98431c8aD98523631AE4a59f267346ea31F984");

    // ==================== Block range tests ====================

    #[test]
    fn test_missing_range_defaults_to_latest() {
        let event = EventConfig::new("PoolCreated", V3_POOL_CREATED);
        let contract = ContractConfig::new("Factory", FACTORY, vec![event.clone()]);
        let filter = LogFilter::for_event(&contract, &event);
        assert_eq!(filter.from_block, BlockTag::Latest);
        assert_eq!(filter.to_block, BlockTag::Latest);
        assert!(!filter.is_bounded());
    }

    #[test]
    fn test_partial_range() {
        let event = EventConfig::new("PoolCreated", V3_POOL_CREATED);
        let contract = ContractConfig::new("Factory", FACTORY, vec![event.clone()])
            .with_block_range(BlockRange::new(Some(12_369_621), None));
        let filter = LogFilter::for_event(&contract, &event);
        assert_eq!(filter.from_block, BlockTag::Number(12_369_621));
        assert_eq!(filter.to_block, BlockTag::Latest);
        assert!(filter.is_bounded());
    }

    #[test]
    fn test_rpc_filter_carries_bounds() {
        let filter = LogFilter::new(FACTORY, V3_POOL_CREATED)
            .with_range(BlockRange::new(Some(10), Some(20)))
            .to_rpc();
        assert_eq!(filter.get_from_block(), Some(10));
        assert_eq!(filter.get_to_block(), Some(20));
    }

    // ==================== Topic tests ====================

    #[test]
    fn test_extra_topics_are_anded() {
        let sender = B256::repeat_byte(0x11);
        let filter = LogFilter::new(FACTORY, ERC20_TRANSFER).with_topics(vec![sender]);

        assert!(filter.matches(&FACTORY, &[ERC20_TRANSFER, sender, B256::ZERO]));
        assert!(!filter.matches(&FACTORY, &[ERC20_TRANSFER, B256::ZERO, sender]));
        assert!(!filter.matches(&FACTORY, &[ERC20_TRANSFER]));
        assert!(!filter.matches(&Address::ZERO, &[ERC20_TRANSFER, sender]));
    }

    #[test]
    fn test_signature_must_match() {
        let filter = LogFilter::new(FACTORY, ERC20_TRANSFER);
        assert!(filter.matches(&FACTORY, &[ERC20_TRANSFER]));
        assert!(!filter.matches(&FACTORY, &[V3_POOL_CREATED]));
        assert!(!filter.matches(&FACTORY, &[]));
    }

    #[test]
    fn test_rpc_filter_topics() {
        let topic1 = B256::repeat_byte(1);
        let topic2 = B256::repeat_byte(2);
        let filter = LogFilter::new(FACTORY, ERC20_TRANSFER)
            .with_topics(vec![topic1, topic2])
            .to_rpc();
        assert!(filter.topics[0].matches(&ERC20_TRANSFER));
        assert!(filter.topics[1].matches(&topic1));
        assert!(filter.topics[2].matches(&topic2));
        assert!(filter.topics[3].is_empty());
    }

    #[test]
    fn test_display() {
        let filter = LogFilter::new(FACTORY, ERC20_TRANSFER);
        assert!(filter.to_string().contains("blocks=latest..latest"));
    }
}
