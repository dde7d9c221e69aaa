//! Generic pass-through decoder, the chain's safety net.

use std::collections::BTreeMap;

use alloy::primitives::B256;

use crate::events::{DecodedEvent, GenericEvent};
use crate::signatures;
use crate::types::{ContractConfig, RawLogEntry};

use super::{DecodeContext, DecodeError, LogDecoder};

/// Emits a [`GenericEvent`] carrying the raw topics and data unchanged.
///
/// Never fails. When topic-0 is a well-known signature its canonical form is
/// recorded under `"signature"` in the decoded parameter map.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericDecoder;

impl GenericDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Infallible form used by the chain's fallback path
    pub fn build(&self, log: &RawLogEntry, ctx: &DecodeContext<'_>) -> GenericEvent {
        let mut decoded_parameters = BTreeMap::new();
        if let Some(known) = log.topic0().and_then(signatures::lookup) {
            decoded_parameters.insert(
                "signature".to_string(),
                serde_json::Value::String(known.signature().to_string()),
            );
        }

        GenericEvent {
            event_name: ctx.event.name.clone(),
            provenance: ctx.provenance(log),
            topics: log.topics.clone(),
            data: log.data.clone(),
            decoded_parameters,
        }
    }
}

impl LogDecoder for GenericDecoder {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn signatures(&self) -> &[B256] {
        &[]
    }

    fn supports(&self, _contract: &ContractConfig) -> bool {
        true
    }

    fn decode(&self, log: &RawLogEntry, ctx: &DecodeContext<'_>) -> Result<DecodedEvent, DecodeError> {
        Ok(DecodedEvent::Generic(self.build(log, ctx)))
    }
}
