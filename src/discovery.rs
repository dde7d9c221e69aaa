//! Pool Discovery
//!
//! Watches the factory contract for pool creation events and registers a
//! subscription for every new pool. Configured pools are seeded through the
//! same path, so each pool address is registered at most once no matter how
//! often it is seen.

use std::sync::Arc;

use alloy::primitives::Address;
use dashmap::DashSet;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{DiscoveryConfig, PoolSeed};
use crate::decoder::{address_word, topic_address};
use crate::filter::LogFilter;
use crate::registry::SubscriptionRegistry;
use crate::types::{format_address, ContractConfig, RawLogEntry};

/// Prefix of the contract name given to every monitored pool
pub const POOL_NAME_PREFIX: &str = "UniswapV3Pool_";

/// `PoolCreated(address indexed token0, address indexed token1, uint24 indexed fee,
/// int24 tickSpacing, address pool)` carries the pool in the second data word
const POOL_DATA_WORD: usize = 1;

const POOL_CREATED_TOPICS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Idle,
    Watching,
}

/// A pool announced by the factory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolCreated {
    pub pool: Address,
    pub token0: Address,
    pub token1: Address,
}

impl PoolCreated {
    /// `<token0 prefix>/<token1 prefix>`, e.g. `0xa0b8/0xc02a`
    pub fn name(&self) -> String {
        format!("{}/{}", short(self.token0), short(self.token1))
    }
}

fn short(address: Address) -> String {
    format_address(address).chars().take(6).collect()
}

pub struct PoolDiscovery {
    config: DiscoveryConfig,
    registry: SubscriptionRegistry,
    known: DashSet<Address>,
    state: Mutex<DiscoveryState>,
}

impl PoolDiscovery {
    pub fn new(config: DiscoveryConfig, registry: SubscriptionRegistry) -> Self {
        Self {
            config,
            registry,
            known: DashSet::new(),
            state: Mutex::new(DiscoveryState::Idle),
        }
    }

    pub fn state(&self) -> DiscoveryState {
        *self.state.lock()
    }

    /// Addresses of every pool registered so far
    pub fn known_pools(&self) -> Vec<Address> {
        let mut pools: Vec<_> = self.known.iter().map(|a| *a).collect();
        pools.sort();
        pools
    }

    /// Register the seeded pools, then watch the factory until `cancel` fires.
    ///
    /// Returns `None` when discovery is disabled or already watching.
    pub fn start(self: &Arc<Self>, seeds: &[PoolSeed], cancel: CancellationToken) -> Option<JoinHandle<()>> {
        for seed in seeds {
            self.add_pool(seed.address, &seed.name);
        }

        if !self.config.enabled {
            info!("Pool discovery disabled");
            return None;
        }

        {
            let mut state = self.state.lock();
            if *state == DiscoveryState::Watching {
                warn!("Pool discovery already watching");
                return None;
            }
            *state = DiscoveryState::Watching;
        }

        let discovery = Arc::clone(self);
        Some(tokio::spawn(async move {
            discovery.watch(cancel).await;
            *discovery.state.lock() = DiscoveryState::Idle;
        }))
    }

    async fn watch(&self, cancel: CancellationToken) {
        let filter = LogFilter::new(self.config.factory_address, self.config.pool_created_signature);
        let transport = self.registry.transport().clone();

        let subscribed = tokio::select! {
            _ = cancel.cancelled() => return,
            result = transport.subscribe_logs(filter) => result,
        };
        let mut logs = match subscribed {
            Ok(logs) => logs,
            Err(e) => {
                error!(error = %e, "Failed to start pool discovery");
                return;
            }
        };
        info!(factory = %self.config.factory_address, "Listening for new pool creation events");

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = logs.next() => next,
            };

            match next {
                Some(Ok(log)) => {
                    self.handle_pool_created(&log);
                }
                Some(Err(e)) => {
                    error!(error = %e, "Error listening for new pools");
                    return;
                }
                None => {
                    warn!("Factory stream ended, pool discovery is inactive");
                    return;
                }
            }
        }
        info!("Pool discovery stopped");
    }

    /// Parse a creation log. `None` when it is not a well-formed creation event.
    pub fn parse_pool_created(&self, log: &RawLogEntry) -> Option<PoolCreated> {
        if log.topics.len() < POOL_CREATED_TOPICS || log.topic0() != Some(&self.config.pool_created_signature) {
            debug!(tx = %log.transaction_hash, "Ignoring non-creation log from factory");
            return None;
        }

        let parsed = topic_address(log, 1).and_then(|token0| {
            let token1 = topic_address(log, 2)?;
            let pool = address_word(&log.data, POOL_DATA_WORD)?;
            Ok(PoolCreated { pool, token0, token1 })
        });

        match parsed {
            Ok(created) => Some(created),
            Err(e) => {
                warn!(tx = %log.transaction_hash, error = %e, "Malformed pool creation event");
                None
            }
        }
    }

    /// Handle one factory log. Returns the pool address when it was newly registered.
    pub fn handle_pool_created(&self, log: &RawLogEntry) -> Option<Address> {
        let created = self.parse_pool_created(log)?;
        let name = created.name();
        info!(pool = %created.pool, %name, "New pool created");
        self.add_pool(created.pool, &name).then_some(created.pool)
    }

    /// Register a pool unless already known. Returns true on first sight.
    pub fn add_pool(&self, address: Address, name: &str) -> bool {
        if !self.known.insert(address) {
            debug!(pool = %address, "Pool already monitored");
            return false;
        }

        info!(pool = %address, %name, "Adding pool to monitoring");
        let contract = ContractConfig::new(
            format!("{POOL_NAME_PREFIX}{name}"),
            address,
            vec![self.config.pool_event.clone()],
        );
        self.registry.register_dynamic(&contract);
        true
    }
}
