//! Decoder Chain
//!
//! Priority-ordered chain of responsibility. For every raw log exactly one
//! event is produced: the first claiming decoder's output, or a generic event
//! when nobody claims the log or the claiming decoder fails.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::events::DecodedEvent;
use crate::transport::NodeTransport;
use crate::types::{ContractConfig, EventConfig, RawLogEntry};

use super::{
    AmmInitializeDecoder, AmmLiquidityDecoder, AmmSwapDecoder, DecodeContext, GenericDecoder, LogDecoder,
    TimestampResolver, TransferDecoder,
};

/// Priority of the built-in AMM decoders
pub const AMM_PRIORITY: i32 = 10;
/// Priority of the built-in transfer decoder
pub const TRANSFER_PRIORITY: i32 = 5;

/// A decoder and its priority. Higher priorities are evaluated first.
#[derive(Clone)]
pub struct DecoderRegistration {
    pub decoder: Arc<dyn LogDecoder>,
    pub priority: i32,
}

pub struct DecoderChain {
    registrations: Vec<DecoderRegistration>,
    fallback: GenericDecoder,
    timestamps: TimestampResolver,
    bus: Arc<EventBus>,
}

impl DecoderChain {
    /// An empty chain: every log becomes a generic event
    pub fn new(transport: Arc<dyn NodeTransport>, bus: Arc<EventBus>) -> Self {
        Self {
            registrations: Vec::new(),
            fallback: GenericDecoder::new(),
            timestamps: TimestampResolver::new(transport),
            bus,
        }
    }

    /// Chain with the transfer and AMM decoders registered
    pub fn with_default_decoders(transport: Arc<dyn NodeTransport>, bus: Arc<EventBus>) -> Self {
        let mut chain = Self::new(transport, bus);
        chain.register(Arc::new(AmmInitializeDecoder), AMM_PRIORITY);
        chain.register(Arc::new(AmmSwapDecoder), AMM_PRIORITY);
        chain.register(Arc::new(AmmLiquidityDecoder), AMM_PRIORITY);
        chain.register(Arc::new(TransferDecoder), TRANSFER_PRIORITY);
        chain
    }

    /// Add a decoder. Among equal priorities, earlier registrations win.
    pub fn register(&mut self, decoder: Arc<dyn LogDecoder>, priority: i32) {
        let position = self.registrations.partition_point(|r| r.priority >= priority);
        debug!(decoder = decoder.name(), priority, position, "Registered decoder");
        self.registrations
            .insert(position, DecoderRegistration { decoder, priority });
    }

    /// Decoder names in evaluation order
    pub fn order(&self) -> Vec<&'static str> {
        self.registrations.iter().map(|r| r.decoder.name()).collect()
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// First registered decoder claiming this log, if any
    pub fn select(&self, log: &RawLogEntry, contract: &ContractConfig) -> Option<&DecoderRegistration> {
        self.registrations
            .iter()
            .find(|r| r.decoder.claims(log, contract))
    }

    /// Decode without publishing. Never fails.
    pub fn decode(
        &self,
        log: &RawLogEntry,
        contract: &ContractConfig,
        event: &EventConfig,
        timestamp: DateTime<Utc>,
    ) -> DecodedEvent {
        let ctx = DecodeContext {
            contract,
            event,
            timestamp,
        };

        if let Some(registration) = self.select(log, contract) {
            match registration.decoder.decode(log, &ctx) {
                Ok(decoded) => return decoded,
                Err(e) => warn!(
                    decoder = registration.decoder.name(),
                    contract = %contract.name,
                    event = %event.name,
                    block = log.block_number,
                    log_index = log.log_index,
                    error = %e,
                    "Decode failed, falling back to generic event"
                ),
            }
        }

        DecodedEvent::Generic(self.fallback.build(log, &ctx))
    }

    /// Resolve the block timestamp, decode, and publish the result on the bus
    pub async fn dispatch(&self, log: &RawLogEntry, contract: &ContractConfig, event: &EventConfig) -> DecodedEvent {
        let timestamp = self.timestamps.resolve(log).await;
        let decoded = self.decode(log, contract, event, timestamp);
        debug!(
            kind = %decoded.kind(),
            contract = %contract.name,
            block = log.block_number,
            log_index = log.log_index,
            "Dispatching event"
        );
        self.bus.publish(&decoded);
        decoded
    }
}
