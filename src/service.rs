//! Ingestor
//!
//! Wires transport, decoder chain, registry, block watcher and discovery
//! around one event bus and owns their lifecycle.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::block_watcher::BlockWatcher;
use crate::bus::EventBus;
use crate::config::IngestorConfig;
use crate::decoder::DecoderChain;
use crate::discovery::PoolDiscovery;
use crate::registry::SubscriptionRegistry;
use crate::transport::{AlloyTransport, NodeTransport, TransportError};
use crate::types::{ContractConfig, SubscriptionKey};

pub struct Ingestor {
    config: IngestorConfig,
    bus: Arc<EventBus>,
    registry: SubscriptionRegistry,
    block_watcher: BlockWatcher,
    discovery: Arc<PoolDiscovery>,
    tasks: Vec<JoinHandle<()>>,
}

impl Ingestor {
    /// Connect to the configured node and build the default pipeline
    pub async fn connect(config: IngestorConfig, bus: Arc<EventBus>) -> Result<Self, TransportError> {
        let transport = AlloyTransport::connect(&config.node_url, config.streaming_endpoint(), &config.transport).await?;
        Ok(Self::with_transport(config, Arc::new(transport), bus))
    }

    /// Build the pipeline on an existing transport with the default decoders
    pub fn with_transport(config: IngestorConfig, transport: Arc<dyn NodeTransport>, bus: Arc<EventBus>) -> Self {
        let chain = DecoderChain::with_default_decoders(transport.clone(), bus);
        Self::with_chain(config, transport, chain)
    }

    /// Build the pipeline around a custom decoder chain
    pub fn with_chain(config: IngestorConfig, transport: Arc<dyn NodeTransport>, chain: DecoderChain) -> Self {
        let bus = chain.bus().clone();
        let registry = SubscriptionRegistry::new(transport.clone(), Arc::new(chain), config.resubscribe.clone());
        let block_watcher = BlockWatcher::new(transport, bus.clone());
        let discovery = Arc::new(PoolDiscovery::new(config.discovery.clone(), registry.clone()));

        Self {
            config,
            bus,
            registry,
            block_watcher,
            discovery,
            tasks: Vec::new(),
        }
    }

    /// Subscribe to the configured contracts, then start block watching and
    /// pool discovery
    pub fn start(&mut self) {
        info!(contracts = self.config.contracts.len(), "Starting ingestor");

        for contract in &self.config.contracts {
            self.registry.register(contract);
        }

        if let Some(handle) = self
            .block_watcher
            .start(self.config.streaming_endpoint(), self.registry.child_token())
        {
            self.tasks.push(handle);
        }

        if let Some(handle) = self.discovery.start(&self.config.pools, self.registry.child_token()) {
            self.tasks.push(handle);
        }

        info!(subscriptions = self.registry.len(), "Ingestor started");
    }

    /// Begin monitoring another contract without restarting
    pub fn add_dynamic_contract(&self, contract: ContractConfig) -> Vec<SubscriptionKey> {
        self.registry.register_dynamic(&contract)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn discovery(&self) -> &Arc<PoolDiscovery> {
        &self.discovery
    }

    /// Cancel every subscription and background task without waiting for them
    pub fn shutdown(&mut self) {
        info!("Stopping ingestor");
        self.registry.shutdown();
        self.tasks.clear();
    }
}

impl Drop for Ingestor {
    fn drop(&mut self) {
        if !self.registry.is_shut_down() {
            self.registry.shutdown();
        }
    }
}
