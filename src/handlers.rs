//! Logging Handler
//!
//! Reference consumer that writes one line per published event.

use tracing::info;

use crate::bus::{EventHandler, HandlerError};
use crate::events::{format_id, DecodedEvent};

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl LoggingHandler {
    /// Render the log line for an event
    pub fn describe(event: &DecodedEvent) -> String {
        match event {
            DecodedEvent::Generic(e) => format!(
                "Event {} from {:#x} in block {}",
                e.event_name, e.provenance.contract_address, e.provenance.block_number
            ),
            DecodedEvent::TokenTransfer(e) => format!(
                "Transfer {} from {:#x} to {:#x} on {:#x}",
                e.value, e.from, e.to, e.provenance.contract_address
            ),
            DecodedEvent::AmmSwap(e) => format!(
                "Swap in pool {}: amount0={} amount1={} tick={}",
                format_id(&e.pool_id),
                e.amount0,
                e.amount1,
                e.tick
            ),
            DecodedEvent::AmmPoolInitialized(e) => format!(
                "Pool {} initialized: {:#x}/{:#x} fee={} tickSpacing={}",
                format_id(&e.pool_id),
                e.currency0,
                e.currency1,
                e.fee,
                e.tick_spacing
            ),
            DecodedEvent::AmmLiquidityChanged(e) => format!(
                "Liquidity changed in pool {}: [{}, {}] delta={}",
                format_id(&e.pool_id),
                e.tick_lower,
                e.tick_upper,
                e.liquidity_delta
            ),
            DecodedEvent::Block(e) => format!(
                "Block {} with {} transactions, gas used {}",
                e.block_number, e.transaction_count, e.gas_used
            ),
        }
    }
}

impl EventHandler for LoggingHandler {
    fn name(&self) -> &str {
        "logging"
    }

    fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        info!(kind = %event.kind(), "{}", Self::describe(event));
        Ok(())
    }
}
