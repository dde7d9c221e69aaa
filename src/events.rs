//! Decoded Events
//!
//! The closed set of typed events published on the bus. Every raw log becomes
//! exactly one of the log-derived variants; every observed block header becomes
//! one `Block`.

use std::collections::BTreeMap;
use std::fmt;

use alloy::primitives::{Address, Bytes, B256, I256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a log-derived event came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub contract_address: Address,
    pub transaction_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
    pub timestamp: DateTime<Utc>,
}

/// Signature-agnostic event carrying the raw topics and data verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericEvent {
    pub event_name: String,
    #[serde(flatten)]
    pub provenance: Provenance,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub decoded_parameters: BTreeMap<String, serde_json::Value>,
}

/// Fungible token `Transfer`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransferEvent {
    #[serde(flatten)]
    pub provenance: Provenance,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

/// AMM pool `Initialize`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmmPoolInitializedEvent {
    #[serde(flatten)]
    pub provenance: Provenance,
    pub pool_id: B256,
    pub currency0: Address,
    pub currency1: Address,
    pub fee: u32,
    pub tick_spacing: i32,
    pub hooks: Address,
    /// Present on the deployed V4 layout only
    pub sqrt_price_x96: Option<U256>,
    pub tick: Option<i32>,
}

/// AMM `Swap`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmmSwapEvent {
    #[serde(flatten)]
    pub provenance: Provenance,
    /// V4 pool id, or the pool address left-padded for V3 pools
    pub pool_id: B256,
    pub sender: Address,
    /// V3 pools only
    pub recipient: Option<Address>,
    pub amount0: I256,
    pub amount1: I256,
    pub sqrt_price_x96: U256,
    pub liquidity: u128,
    pub tick: i32,
}

/// AMM `ModifyLiquidity`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmmLiquidityChangedEvent {
    #[serde(flatten)]
    pub provenance: Provenance,
    pub pool_id: B256,
    pub sender: Address,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity_delta: I256,
}

/// New block notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEvent {
    pub block_number: u64,
    pub block_hash: B256,
    pub parent_hash: B256,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: DateTime<Utc>,
    pub miner: Address,
    pub transaction_hashes: Vec<B256>,
    pub transaction_count: usize,
}

/// Everything that can be published on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DecodedEvent {
    Generic(GenericEvent),
    TokenTransfer(TokenTransferEvent),
    AmmSwap(AmmSwapEvent),
    AmmPoolInitialized(AmmPoolInitializedEvent),
    AmmLiquidityChanged(AmmLiquidityChangedEvent),
    Block(BlockEvent),
}

/// Variant tag used to route events to handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Generic,
    TokenTransfer,
    AmmSwap,
    AmmPoolInitialized,
    AmmLiquidityChanged,
    Block,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Generic,
        EventKind::TokenTransfer,
        EventKind::AmmSwap,
        EventKind::AmmPoolInitialized,
        EventKind::AmmLiquidityChanged,
        EventKind::Block,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Generic => "generic",
            EventKind::TokenTransfer => "token_transfer",
            EventKind::AmmSwap => "amm_swap",
            EventKind::AmmPoolInitialized => "amm_pool_initialized",
            EventKind::AmmLiquidityChanged => "amm_liquidity_changed",
            EventKind::Block => "block",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl DecodedEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DecodedEvent::Generic(_) => EventKind::Generic,
            DecodedEvent::TokenTransfer(_) => EventKind::TokenTransfer,
            DecodedEvent::AmmSwap(_) => EventKind::AmmSwap,
            DecodedEvent::AmmPoolInitialized(_) => EventKind::AmmPoolInitialized,
            DecodedEvent::AmmLiquidityChanged(_) => EventKind::AmmLiquidityChanged,
            DecodedEvent::Block(_) => EventKind::Block,
        }
    }

    /// Log provenance; `None` for block events
    pub fn provenance(&self) -> Option<&Provenance> {
        match self {
            DecodedEvent::Generic(e) => Some(&e.provenance),
            DecodedEvent::TokenTransfer(e) => Some(&e.provenance),
            DecodedEvent::AmmSwap(e) => Some(&e.provenance),
            DecodedEvent::AmmPoolInitialized(e) => Some(&e.provenance),
            DecodedEvent::AmmLiquidityChanged(e) => Some(&e.provenance),
            DecodedEvent::Block(_) => None,
        }
    }

    pub fn block_number(&self) -> u64 {
        match self {
            DecodedEvent::Block(b) => b.block_number,
            other => other.provenance().map_or(0, |p| p.block_number),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DecodedEvent::Block(b) => b.timestamp,
            other => other.provenance().map_or_else(Utc::now, |p| p.timestamp),
        }
    }

    /// Serialize the event to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize an event from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Seconds since the epoch as a UTC timestamp, `now` if out of range
pub fn timestamp_from_secs(secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .unwrap_or_else(Utc::now)
}

/// Format a 32-byte id as hex with 0x prefix
pub fn format_id(id: &B256) -> String {
    format!("0x{}", hex::encode(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn provenance() -> Provenance {
        Provenance {
            contract_address: address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"),
            transaction_hash: B256::repeat_byte(0xab),
            block_number: 19_000_000,
            log_index: 7,
            timestamp: timestamp_from_secs(1_703_000_000),
        }
    }

    #[test]
    fn test_kind_matches_variant() {
        let event = DecodedEvent::TokenTransfer(TokenTransferEvent {
            provenance: provenance(),
            from: Address::ZERO,
            to: Address::ZERO,
            value: U256::from(1000),
        });
        assert_eq!(event.kind(), EventKind::TokenTransfer);
        assert_eq!(event.block_number(), 19_000_000);
    }

    #[test]
    fn test_block_event_has_no_provenance() {
        let event = DecodedEvent::Block(BlockEvent {
            block_number: 5,
            block_hash: B256::ZERO,
            parent_hash: B256::ZERO,
            gas_limit: 30_000_000,
            gas_used: 0,
            timestamp: timestamp_from_secs(1_703_000_000),
            miner: Address::ZERO,
            transaction_hashes: vec![],
            transaction_count: 0,
        });
        assert!(event.provenance().is_none());
        assert_eq!(event.block_number(), 5);
        assert_eq!(event.timestamp().timestamp(), 1_703_000_000);
    }

    #[test]
    fn test_json_is_tagged_and_camel_case() {
        let event = DecodedEvent::TokenTransfer(TokenTransferEvent {
            provenance: provenance(),
            from: Address::ZERO,
            to: Address::ZERO,
            value: U256::from(1000),
        });
        let json = event.to_json().unwrap();
        assert!(json.contains("\"type\":\"tokenTransfer\""));
        assert!(json.contains("\"contractAddress\""));
        assert!(json.contains("\"transactionHash\""));
        assert!(json.contains("\"logIndex\":7"));
        assert_eq!(DecodedEvent::from_json(&json).unwrap(), event);
    }

    #[test]
    fn test_timestamp_from_secs() {
        assert_eq!(timestamp_from_secs(0).timestamp(), 0);
        assert_eq!(timestamp_from_secs(1_703_000_000).timestamp(), 1_703_000_000);
    }

    #[test]
    fn test_format_id() {
        assert_eq!(
            format_id(&B256::repeat_byte(0x11)),
            format!("0x{}", "11".repeat(32))
        );
    }

    #[test]
    fn test_event_kind_display() {
        assert_eq!(EventKind::AmmSwap.to_string(), "amm_swap");
        assert_eq!(EventKind::ALL.len(), 6);
    }
}
