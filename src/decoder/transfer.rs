//! Fungible token `Transfer(address indexed from, address indexed to, uint256 value)`

use alloy::primitives::B256;

use crate::events::{DecodedEvent, TokenTransferEvent};
use crate::signatures::ERC20_TRANSFER;
use crate::types::{ContractConfig, RawLogEntry};

use super::{require_topics, topic_address, uint_word, DecodeContext, DecodeError, LogDecoder};

const TRANSFER_TOPICS: usize = 3;

/// Claims contracts that declare the ERC-20 `Transfer` signature.
///
/// ERC-721 transfers share topic-0 but index the token id as a fourth topic;
/// those are rejected here and end up as generic events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransferDecoder;

impl TransferDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl LogDecoder for TransferDecoder {
    fn name(&self) -> &'static str {
        "erc20-transfer"
    }

    fn signatures(&self) -> &[B256] {
        &[ERC20_TRANSFER]
    }

    fn supports(&self, contract: &ContractConfig) -> bool {
        contract.declares_any(self.signatures())
    }

    fn decode(&self, log: &RawLogEntry, ctx: &DecodeContext<'_>) -> Result<DecodedEvent, DecodeError> {
        require_topics(log, TRANSFER_TOPICS)?;
        if log.topics.len() > TRANSFER_TOPICS {
            return Err(DecodeError::TopicCount {
                expected: TRANSFER_TOPICS,
                found: log.topics.len(),
            });
        }

        Ok(DecodedEvent::TokenTransfer(TokenTransferEvent {
            provenance: ctx.provenance(log),
            from: topic_address(log, 1)?,
            to: topic_address(log, 2)?,
            value: uint_word(&log.data, 0, 256)?,
        }))
    }
}
