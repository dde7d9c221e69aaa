//! Known Event Signatures
//!
//! Topic-0 hashes for the events the built-in decoders understand.
//! The AMM entries cover both the compact event ABI and the deployed
//! Uniswap V4 ABI (which appends extra trailing data words).

use std::collections::HashMap;
use std::sync::LazyLock;

use alloy::primitives::{b256, keccak256, B256};

/// ERC-20 `Transfer(address,address,uint256)`
pub const ERC20_TRANSFER: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");
/// ERC-20 `Approval(address,address,uint256)`
pub const ERC20_APPROVAL: B256 =
    b256!("8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925");
/// ERC-721 `ApprovalForAll(address,address,bool)`
pub const ERC721_APPROVAL_FOR_ALL: B256 =
    b256!("17307eab39ab6107e8899845ad3d59bd9653f200f220920489ca2b5937696c31");

/// `Initialize(bytes32,address,address,uint24,int24,address)`
pub const AMM_INITIALIZE: B256 =
    b256!("3fd553db44f207b1f41348cfc4d251860814af9eadc470e8e7895e4d120511f4");
/// `Initialize(bytes32,address,address,uint24,int24,address,uint160,int24)`
pub const AMM_INITIALIZE_V4: B256 =
    b256!("dd466e674ea557f56295e2d0218a125ea4b4f0f6f3307b95f85e6110838d6438");
/// `Swap(bytes32,address,int128,int128,uint160,uint128,int24)`
pub const AMM_SWAP: B256 =
    b256!("9cd312f3503782cb1d29f4114896ca5405e9cf41adf9a23b76f74203d292296e");
/// `Swap(bytes32,address,int128,int128,uint160,uint128,int24,uint24)`
pub const AMM_SWAP_V4: B256 =
    b256!("40e9cecb9f5f1f1c5b9c97dec2917b7ee92e57ba5563708daca94dd84ad7112f");
/// `ModifyLiquidity(bytes32,address,int24,int24,int256)`
pub const AMM_MODIFY_LIQUIDITY: B256 =
    b256!("541c041c2cce48e614b3de043c9280f06b6164c0a1741649e2de3c3d375f7974");
/// `ModifyLiquidity(bytes32,address,int24,int24,int256,bytes32)`
pub const AMM_MODIFY_LIQUIDITY_V4: B256 =
    b256!("f208f4912782fd25c7f114ca3723a2d5dd6f3bcc3ac8db5af63baa85f711d5ec");

/// Uniswap V3 factory `PoolCreated(address,address,uint24,int24,address)`
pub const V3_POOL_CREATED: B256 =
    b256!("783cca1c0412dd0d695e784568c96da2e9c22ff989357a2e8b1d9b2b4e6b7118");
/// Uniswap V3 pool `Swap(address,address,int256,int256,uint160,uint128,int24)`
pub const V3_SWAP: B256 =
    b256!("c42079f94a6350d7e6235f29174924f928cc2ac818eb64fed8004e115fbcca67");

/// Every signature claimed by the AMM decoders
pub const AMM_SIGNATURES: &[B256] = &[
    AMM_INITIALIZE,
    AMM_INITIALIZE_V4,
    AMM_SWAP,
    AMM_SWAP_V4,
    V3_SWAP,
    AMM_MODIFY_LIQUIDITY,
    AMM_MODIFY_LIQUIDITY_V4,
];

/// Events recognised by topic-0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownEvent {
    Erc20Transfer,
    Erc20Approval,
    ApprovalForAll,
    AmmInitialize,
    AmmInitializeV4,
    AmmSwap,
    AmmSwapV4,
    AmmModifyLiquidity,
    AmmModifyLiquidityV4,
    V3PoolCreated,
    V3Swap,
}

impl KnownEvent {
    pub const ALL: [KnownEvent; 11] = [
        KnownEvent::Erc20Transfer,
        KnownEvent::Erc20Approval,
        KnownEvent::ApprovalForAll,
        KnownEvent::AmmInitialize,
        KnownEvent::AmmInitializeV4,
        KnownEvent::AmmSwap,
        KnownEvent::AmmSwapV4,
        KnownEvent::AmmModifyLiquidity,
        KnownEvent::AmmModifyLiquidityV4,
        KnownEvent::V3PoolCreated,
        KnownEvent::V3Swap,
    ];

    /// Returns the topic-0 hash
    pub fn topic0(&self) -> B256 {
        match self {
            KnownEvent::Erc20Transfer => ERC20_TRANSFER,
            KnownEvent::Erc20Approval => ERC20_APPROVAL,
            KnownEvent::ApprovalForAll => ERC721_APPROVAL_FOR_ALL,
            KnownEvent::AmmInitialize => AMM_INITIALIZE,
            KnownEvent::AmmInitializeV4 => AMM_INITIALIZE_V4,
            KnownEvent::AmmSwap => AMM_SWAP,
            KnownEvent::AmmSwapV4 => AMM_SWAP_V4,
            KnownEvent::AmmModifyLiquidity => AMM_MODIFY_LIQUIDITY,
            KnownEvent::AmmModifyLiquidityV4 => AMM_MODIFY_LIQUIDITY_V4,
            KnownEvent::V3PoolCreated => V3_POOL_CREATED,
            KnownEvent::V3Swap => V3_SWAP,
        }
    }

    /// Returns the canonical signature string the topic is hashed from
    pub fn signature(&self) -> &'static str {
        match self {
            KnownEvent::Erc20Transfer => "Transfer(address,address,uint256)",
            KnownEvent::Erc20Approval => "Approval(address,address,uint256)",
            KnownEvent::ApprovalForAll => "ApprovalForAll(address,address,bool)",
            KnownEvent::AmmInitialize => "Initialize(bytes32,address,address,uint24,int24,address)",
            KnownEvent::AmmInitializeV4 => {
                "Initialize(bytes32,address,address,uint24,int24,address,uint160,int24)"
            }
            KnownEvent::AmmSwap => "Swap(bytes32,address,int128,int128,uint160,uint128,int24)",
            KnownEvent::AmmSwapV4 => {
                "Swap(bytes32,address,int128,int128,uint160,uint128,int24,uint24)"
            }
            KnownEvent::AmmModifyLiquidity => "ModifyLiquidity(bytes32,address,int24,int24,int256)",
            KnownEvent::AmmModifyLiquidityV4 => {
                "ModifyLiquidity(bytes32,address,int24,int24,int256,bytes32)"
            }
            KnownEvent::V3PoolCreated => "PoolCreated(address,address,uint24,int24,address)",
            KnownEvent::V3Swap => "Swap(address,address,int256,int256,uint160,uint128,int24)",
        }
    }

    /// Returns the human-readable event name
    pub fn name(&self) -> &'static str {
        match self {
            KnownEvent::Erc20Transfer => "Transfer",
            KnownEvent::Erc20Approval => "Approval",
            KnownEvent::ApprovalForAll => "ApprovalForAll",
            KnownEvent::AmmInitialize | KnownEvent::AmmInitializeV4 => "Initialize",
            KnownEvent::AmmSwap | KnownEvent::AmmSwapV4 | KnownEvent::V3Swap => "Swap",
            KnownEvent::AmmModifyLiquidity | KnownEvent::AmmModifyLiquidityV4 => "ModifyLiquidity",
            KnownEvent::V3PoolCreated => "PoolCreated",
        }
    }
}

/// Static lookup table for topic-0 hashes
static KNOWN_EVENTS: LazyLock<HashMap<B256, KnownEvent>> =
    LazyLock::new(|| KnownEvent::ALL.iter().map(|e| (e.topic0(), *e)).collect());

/// Hash an event signature string into its topic-0
///
/// # Arguments
/// * `signature` - Canonical form, e.g. `"Transfer(address,address,uint256)"`
pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

/// Look up a topic-0 hash
pub fn lookup(topic0: &B256) -> Option<KnownEvent> {
    KNOWN_EVENTS.get(topic0).copied()
}

/// Check if a topic-0 hash belongs to an event we know how to name
pub fn is_known(topic0: &B256) -> bool {
    KNOWN_EVENTS.contains_key(topic0)
}
