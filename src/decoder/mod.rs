//! Log Decoders
//!
//! Turns raw log entries into typed [`DecodedEvent`]s. Each decoder declares the
//! topic-0 signatures it recognises and which contracts it supports; the
//! [`DecoderChain`] picks the first claiming decoder by priority and falls back
//! to the [`GenericDecoder`] when nobody claims a log or decoding fails.
//!
//! ABI layout rules shared by all decoders:
//! * indexed parameters live in `topics[1..]`; an indexed address is the low
//!   20 bytes of its topic word
//! * non-indexed parameters are consecutive 32-byte words of `data`, in
//!   declaration order, sign-extended for signed types

pub mod amm;
pub mod chain;
pub mod generic;
pub mod timestamp;
pub mod transfer;

use alloy::primitives::{Address, B256, I256, U256};
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::events::{DecodedEvent, Provenance};
use crate::types::{topic_to_address, ContractConfig, EventConfig, RawLogEntry, WORD_SIZE};

pub use amm::{AmmInitializeDecoder, AmmLiquidityDecoder, AmmSwapDecoder};
pub use chain::{DecoderChain, DecoderRegistration};
pub use generic::GenericDecoder;
pub use timestamp::TimestampResolver;
pub use transfer::TransferDecoder;

/// Errors that can occur while decoding a single log
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Log has no topics")]
    MissingSignature,

    #[error("Unexpected event signature: {0}")]
    SignatureMismatch(B256),

    #[error("Expected {expected} topics, found {found}")]
    TopicCount { expected: usize, found: usize },

    #[error("Data too short: need {needed} bytes, have {available}")]
    DataTooShort { needed: usize, available: usize },

    #[error("Word {index} does not fit in {bits} bits")]
    ValueOverflow { index: usize, bits: usize },
}

/// Per-log inputs a decoder may need besides the log itself
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext<'a> {
    pub contract: &'a ContractConfig,
    pub event: &'a EventConfig,
    /// Resolved block timestamp for the log
    pub timestamp: DateTime<Utc>,
}

impl DecodeContext<'_> {
    pub fn provenance(&self, log: &RawLogEntry) -> Provenance {
        Provenance {
            contract_address: log.address,
            transaction_hash: log.transaction_hash,
            block_number: log.block_number,
            log_index: log.log_index,
            timestamp: self.timestamp,
        }
    }
}

/// A pluggable log decoder.
pub trait LogDecoder: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Topic-0 hashes this decoder recognises. Empty means any.
    fn signatures(&self) -> &[B256];

    /// Whether this decoder is responsible for the given contract
    fn supports(&self, contract: &ContractConfig) -> bool;

    /// Decode one log. Errors are recovered by the chain.
    fn decode(&self, log: &RawLogEntry, ctx: &DecodeContext<'_>) -> Result<DecodedEvent, DecodeError>;

    /// A decoder claims a log when it supports the contract and recognises the topic-0
    fn claims(&self, log: &RawLogEntry, contract: &ContractConfig) -> bool {
        if !self.supports(contract) {
            return false;
        }
        let signatures = self.signatures();
        signatures.is_empty() || log.topic0().is_some_and(|t| signatures.contains(t))
    }
}

/// Fail unless the log carries at least `expected` topics
pub fn require_topics(log: &RawLogEntry, expected: usize) -> Result<(), DecodeError> {
    if log.topics.len() < expected {
        return Err(DecodeError::TopicCount {
            expected,
            found: log.topics.len(),
        });
    }
    Ok(())
}

/// Indexed topic at `index` as an address
pub fn topic_address(log: &RawLogEntry, index: usize) -> Result<Address, DecodeError> {
    topic(log, index).map(|t| topic_to_address(&t))
}

/// Indexed topic at `index`
pub fn topic(log: &RawLogEntry, index: usize) -> Result<B256, DecodeError> {
    log.topics.get(index).copied().ok_or(DecodeError::TopicCount {
        expected: index + 1,
        found: log.topics.len(),
    })
}

/// Number of complete 32-byte words in a data payload
pub fn word_count(data: &[u8]) -> usize {
    data.len() / WORD_SIZE
}

/// The `index`-th 32-byte word of the data payload
pub fn word(data: &[u8], index: usize) -> Result<B256, DecodeError> {
    let start = index * WORD_SIZE;
    let end = start + WORD_SIZE;
    data.get(start..end)
        .map(B256::from_slice)
        .ok_or(DecodeError::DataTooShort {
            needed: end,
            available: data.len(),
        })
}

/// Unsigned integer of `bits` width from word `index`
pub fn uint_word(data: &[u8], index: usize, bits: usize) -> Result<U256, DecodeError> {
    let value = U256::from_be_bytes(word(data, index)?.0);
    if value.bit_len() > bits {
        return Err(DecodeError::ValueOverflow { index, bits });
    }
    Ok(value)
}

/// Signed integer of `bits` width from word `index`, sign-extended to 256 bits
pub fn int_word(data: &[u8], index: usize, bits: usize) -> Result<I256, DecodeError> {
    let raw = U256::from_be_bytes(word(data, index)?.0);
    // every bit above the declared width must equal the sign bit
    let magnitude = if raw.bit(255) { !raw } else { raw };
    if magnitude.bit_len() >= bits {
        return Err(DecodeError::ValueOverflow { index, bits });
    }
    Ok(I256::from_raw(raw))
}

/// `uint24` as `u32`
pub fn uint24_word(data: &[u8], index: usize) -> Result<u32, DecodeError> {
    let word = uint_word(data, index, 24)?.to_be_bytes::<32>();
    Ok(u32::from_be_bytes([word[28], word[29], word[30], word[31]]))
}

/// `int24` as `i32`
pub fn int24_word(data: &[u8], index: usize) -> Result<i32, DecodeError> {
    let word = int_word(data, index, 24)?.into_raw().to_be_bytes::<32>();
    Ok(i32::from_be_bytes([word[28], word[29], word[30], word[31]]))
}

/// `uint128` as `u128`
pub fn uint128_word(data: &[u8], index: usize) -> Result<u128, DecodeError> {
    let word = uint_word(data, index, 128)?.to_be_bytes::<32>();
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(low))
}

/// `address` stored in a data word
pub fn address_word(data: &[u8], index: usize) -> Result<Address, DecodeError> {
    uint_word(data, index, 160)?;
    word(data, index).map(|w| topic_to_address(&w))
}

#[cfg(test)]
pub(crate) mod test_utils {
    use alloy::primitives::{Address, Bytes, B256, I256, U256};

    use crate::events::timestamp_from_secs;
    use crate::types::{ContractConfig, EventConfig, RawLogEntry};

    use super::DecodeContext;

    pub fn uint(value: u128) -> [u8; 32] {
        U256::from(value).to_be_bytes::<32>()
    }

    pub fn int(value: i128) -> [u8; 32] {
        I256::try_from(value).unwrap().into_raw().to_be_bytes::<32>()
    }

    pub fn addr(address: Address) -> [u8; 32] {
        address.into_word().0
    }

    pub fn data(words: &[[u8; 32]]) -> Bytes {
        Bytes::from(words.concat())
    }

    pub fn log(address: Address, topics: Vec<B256>, data: Bytes) -> RawLogEntry {
        RawLogEntry {
            address,
            topics,
            data,
            transaction_hash: B256::repeat_byte(0xab),
            block_number: 100,
            log_index: 3,
            block_timestamp: Some(1_703_000_000),
        }
    }

    pub fn context<'a>(contract: &'a ContractConfig, event: &'a EventConfig) -> DecodeContext<'a> {
        DecodeContext {
            contract,
            event,
            timestamp: timestamp_from_secs(1_703_000_000),
        }
    }
}
