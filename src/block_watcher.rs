//! Block Watcher
//!
//! Streams new block headers and publishes one `Block` event per header.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::events::{timestamp_from_secs, BlockEvent, DecodedEvent};
use crate::transport::NodeTransport;
use crate::types::RawBlockHeader;

/// Map a header to its bus event
pub fn block_event(header: RawBlockHeader) -> DecodedEvent {
    DecodedEvent::Block(BlockEvent {
        block_number: header.number,
        block_hash: header.hash,
        parent_hash: header.parent_hash,
        gas_limit: header.gas_limit,
        gas_used: header.gas_used,
        timestamp: timestamp_from_secs(header.timestamp),
        miner: header.miner,
        transaction_count: header.transactions.len(),
        transaction_hashes: header.transactions,
    })
}

pub struct BlockWatcher {
    transport: Arc<dyn NodeTransport>,
    bus: Arc<EventBus>,
}

impl BlockWatcher {
    pub fn new(transport: Arc<dyn NodeTransport>, bus: Arc<EventBus>) -> Self {
        Self { transport, bus }
    }

    /// Start watching blocks until `cancel` fires.
    ///
    /// A missing or blank streaming endpoint means block events were not
    /// requested: nothing is spawned and the transport is never touched.
    pub fn start(&self, streaming_url: Option<&str>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if streaming_url.map_or(true, |url| url.trim().is_empty()) {
            info!("Streaming endpoint not configured, block watcher disabled");
            return None;
        }

        let transport = self.transport.clone();
        let bus = self.bus.clone();
        Some(tokio::spawn(async move {
            watch(transport, bus, cancel).await;
        }))
    }
}

async fn watch(transport: Arc<dyn NodeTransport>, bus: Arc<EventBus>, cancel: CancellationToken) {
    let subscribed = tokio::select! {
        _ = cancel.cancelled() => return,
        result = transport.subscribe_blocks() => result,
    };
    let mut blocks = match subscribed {
        Ok(blocks) => blocks,
        Err(e) => {
            error!(error = %e, "Failed to subscribe to new blocks");
            return;
        }
    };
    info!("Block watcher started");

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = blocks.next() => next,
        };

        match next {
            Some(Ok(header)) => {
                debug!(block = header.number, txs = header.transactions.len(), "New block");
                bus.publish(&block_event(header));
            }
            Some(Err(e)) => warn!(error = %e, "Skipping block"),
            None => {
                error!("Block stream ended, block watcher is inactive");
                return;
            }
        }
    }
    info!("Block watcher stopped");
}
