//! AMM pool decoders: `Initialize`, `Swap` and `ModifyLiquidity`.
//!
//! All three claim contracts whose name mentions Uniswap, or that declare any
//! AMM signature. Each one only recognises its own topic-0 hashes, so a
//! contract monitored for several AMM events routes every log to the right
//! decoder.

use alloy::primitives::B256;

use crate::events::{AmmLiquidityChangedEvent, AmmPoolInitializedEvent, AmmSwapEvent, DecodedEvent};
use crate::signatures::{
    AMM_INITIALIZE, AMM_INITIALIZE_V4, AMM_MODIFY_LIQUIDITY, AMM_MODIFY_LIQUIDITY_V4, AMM_SIGNATURES,
    AMM_SWAP, AMM_SWAP_V4, V3_SWAP,
};
use crate::types::{ContractConfig, RawLogEntry};

use super::{
    address_word, int24_word, int_word, require_topics, topic, topic_address, uint128_word, uint24_word,
    uint_word, word_count, DecodeContext, DecodeError, LogDecoder,
};

const NAME_HINT: &str = "uniswap";

fn supports_amm(contract: &ContractConfig) -> bool {
    contract.name.to_lowercase().contains(NAME_HINT) || contract.declares_any(AMM_SIGNATURES)
}

/// `Initialize(bytes32 indexed id, address indexed currency0, address indexed currency1,
/// uint24 fee, int24 tickSpacing, address hooks[, uint160 sqrtPriceX96, int24 tick])`
#[derive(Debug, Default, Clone, Copy)]
pub struct AmmInitializeDecoder;

impl LogDecoder for AmmInitializeDecoder {
    fn name(&self) -> &'static str {
        "amm-initialize"
    }

    fn signatures(&self) -> &[B256] {
        &[AMM_INITIALIZE, AMM_INITIALIZE_V4]
    }

    fn supports(&self, contract: &ContractConfig) -> bool {
        supports_amm(contract)
    }

    fn decode(&self, log: &RawLogEntry, ctx: &DecodeContext<'_>) -> Result<DecodedEvent, DecodeError> {
        require_topics(log, 4)?;
        let data = &log.data;

        // the deployed layout appends the starting price and tick
        let (sqrt_price_x96, tick) = if word_count(data) >= 5 {
            (Some(uint_word(data, 3, 160)?), Some(int24_word(data, 4)?))
        } else {
            (None, None)
        };

        Ok(DecodedEvent::AmmPoolInitialized(AmmPoolInitializedEvent {
            provenance: ctx.provenance(log),
            pool_id: topic(log, 1)?,
            currency0: topic_address(log, 2)?,
            currency1: topic_address(log, 3)?,
            fee: uint24_word(data, 0)?,
            tick_spacing: int24_word(data, 1)?,
            hooks: address_word(data, 2)?,
            sqrt_price_x96,
            tick,
        }))
    }
}

/// `Swap(bytes32 indexed id, address indexed sender, int128 amount0, int128 amount1,
/// uint160 sqrtPriceX96, uint128 liquidity, int24 tick[, uint24 fee])`
///
/// Also decodes V3 pool swaps, `Swap(address indexed sender, address indexed recipient,
/// int256 amount0, int256 amount1, uint160 sqrtPriceX96, uint128 liquidity, int24 tick)`,
/// using the pool address as the pool id.
#[derive(Debug, Default, Clone, Copy)]
pub struct AmmSwapDecoder;

impl LogDecoder for AmmSwapDecoder {
    fn name(&self) -> &'static str {
        "amm-swap"
    }

    fn signatures(&self) -> &[B256] {
        &[AMM_SWAP, AMM_SWAP_V4, V3_SWAP]
    }

    fn supports(&self, contract: &ContractConfig) -> bool {
        supports_amm(contract)
    }

    fn decode(&self, log: &RawLogEntry, ctx: &DecodeContext<'_>) -> Result<DecodedEvent, DecodeError> {
        require_topics(log, 3)?;
        let data = &log.data;
        let is_v3 = log.topic0() == Some(&V3_SWAP);

        let (pool_id, sender, recipient, amount_bits) = if is_v3 {
            (
                log.address.into_word(),
                topic_address(log, 1)?,
                Some(topic_address(log, 2)?),
                256,
            )
        } else {
            (topic(log, 1)?, topic_address(log, 2)?, None, 128)
        };

        Ok(DecodedEvent::AmmSwap(AmmSwapEvent {
            provenance: ctx.provenance(log),
            pool_id,
            sender,
            recipient,
            amount0: int_word(data, 0, amount_bits)?,
            amount1: int_word(data, 1, amount_bits)?,
            sqrt_price_x96: uint_word(data, 2, 160)?,
            liquidity: uint128_word(data, 3)?,
            tick: int24_word(data, 4)?,
        }))
    }
}

/// `ModifyLiquidity(bytes32 indexed id, address indexed sender, int24 tickLower,
/// int24 tickUpper, int256 liquidityDelta[, bytes32 salt])`
#[derive(Debug, Default, Clone, Copy)]
pub struct AmmLiquidityDecoder;

impl LogDecoder for AmmLiquidityDecoder {
    fn name(&self) -> &'static str {
        "amm-modify-liquidity"
    }

    fn signatures(&self) -> &[B256] {
        &[AMM_MODIFY_LIQUIDITY, AMM_MODIFY_LIQUIDITY_V4]
    }

    fn supports(&self, contract: &ContractConfig) -> bool {
        supports_amm(contract)
    }

    fn decode(&self, log: &RawLogEntry, ctx: &DecodeContext<'_>) -> Result<DecodedEvent, DecodeError> {
        require_topics(log, 3)?;
        let data = &log.data;

        Ok(DecodedEvent::AmmLiquidityChanged(AmmLiquidityChangedEvent {
            provenance: ctx.provenance(log),
            pool_id: topic(log, 1)?,
            sender: topic_address(log, 2)?,
            tick_lower: int24_word(data, 0)?,
            tick_upper: int24_word(data, 1)?,
            liquidity_delta: int_word(data, 2, 256)?,
        }))
    }
}
