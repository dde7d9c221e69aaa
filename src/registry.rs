//! Subscription Registry
//!
//! Owns one streaming task per (contract address, event name). Each task
//! subscribes through the node transport, hands every log to the decoder chain
//! and runs until cancelled, until its stream fails, or until a bounded block
//! range is exhausted.
//!
//! Registration is insert-if-absent on the key, so registering the same
//! contract twice (at startup, from discovery, or from an external trigger)
//! never produces a second subscription.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ResubscribePolicy;
use crate::decoder::DecoderChain;
use crate::filter::{BlockTag, LogFilter};
use crate::transport::NodeTransport;
use crate::types::{ContractConfig, EventConfig, SubscriptionKey};

/// A live subscription task and the token that stops it
struct Subscription {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    transport: Arc<dyn NodeTransport>,
    chain: Arc<DecoderChain>,
    policy: ResubscribePolicy,
    subscriptions: DashMap<SubscriptionKey, Subscription>,
    root: CancellationToken,
}

/// Shared handle to the registry; clones refer to the same subscriptions
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<Inner>,
}

impl SubscriptionRegistry {
    pub fn new(transport: Arc<dyn NodeTransport>, chain: Arc<DecoderChain>, policy: ResubscribePolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                chain,
                policy,
                subscriptions: DashMap::new(),
                root: CancellationToken::new(),
            }),
        }
    }

    /// Subscribe to every enabled event of `contract`.
    ///
    /// Returns the keys that were newly registered. Keys already present are
    /// skipped, so calling this twice is harmless.
    pub fn register(&self, contract: &ContractConfig) -> Vec<SubscriptionKey> {
        if self.inner.root.is_cancelled() {
            warn!(contract = %contract.name, "Registry is shut down, ignoring registration");
            return Vec::new();
        }
        if let Some(range) = contract.block_range.filter(|range| !range.is_valid()) {
            warn!(
                contract = %contract.name,
                from = ?range.from_block,
                to = ?range.to_block,
                "Block range ends before it starts, ignoring registration"
            );
            return Vec::new();
        }

        let shared = Arc::new(contract.clone());
        let mut added = Vec::new();

        for event in contract.enabled_events() {
            let key = SubscriptionKey::new(contract.address, event.name.clone());
            match self.inner.subscriptions.entry(key.clone()) {
                Entry::Occupied(_) => {
                    info!(%key, "Subscription already registered, keeping the first one");
                }
                Entry::Vacant(slot) => {
                    let token = self.inner.root.child_token();
                    let task = SubscriptionTask {
                        key: key.clone(),
                        contract: shared.clone(),
                        event: event.clone(),
                        transport: self.inner.transport.clone(),
                        chain: self.inner.chain.clone(),
                        policy: self.inner.policy.clone(),
                        token: token.clone(),
                    };
                    let handle = tokio::spawn(task.run());
                    slot.insert(Subscription { token, handle });
                    added.push(key);
                }
            }
        }

        // shutdown may have cleared the map between the check above and the inserts
        if self.inner.root.is_cancelled() {
            for key in &added {
                self.remove(key);
            }
            return Vec::new();
        }

        if added.is_empty() && contract.enabled_events().next().is_none() {
            info!(contract = %contract.name, "No enabled events, nothing to subscribe");
        } else {
            info!(contract = %contract.name, added = added.len(), "Registered contract");
        }
        added
    }

    /// Same as [`register`](Self::register); for contracts added after startup
    pub fn register_dynamic(&self, contract: &ContractConfig) -> Vec<SubscriptionKey> {
        info!(contract = %contract.name, address = %contract.address, "Adding dynamic contract");
        self.register(contract)
    }

    /// Cancel and forget one subscription
    pub fn remove(&self, key: &SubscriptionKey) -> bool {
        match self.inner.subscriptions.remove(key) {
            Some((_, subscription)) => {
                subscription.token.cancel();
                info!(%key, "Subscription removed");
                true
            }
            None => false,
        }
    }

    /// Cancel every subscription. Does not wait for the tasks to finish.
    pub fn shutdown(&self) -> usize {
        self.inner.root.cancel();
        let count = self.inner.subscriptions.len();
        self.inner.subscriptions.clear();
        info!(cancelled = count, "Subscription registry shut down");
        count
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.root.is_cancelled()
    }

    /// Keys whose task has ended without being removed
    pub fn inactive(&self) -> Vec<SubscriptionKey> {
        self.inner
            .subscriptions
            .iter()
            .filter(|entry| entry.value().handle.is_finished())
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.inner.subscriptions.contains_key(key)
    }

    pub fn keys(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<_> = self.inner.subscriptions.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.inner.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.subscriptions.is_empty()
    }

    /// Token cancelled together with every subscription on shutdown
    pub fn child_token(&self) -> CancellationToken {
        self.inner.root.child_token()
    }

    pub fn transport(&self) -> &Arc<dyn NodeTransport> {
        &self.inner.transport
    }

    pub fn chain(&self) -> &Arc<DecoderChain> {
        &self.inner.chain
    }
}

struct SubscriptionTask {
    key: SubscriptionKey,
    contract: Arc<ContractConfig>,
    event: EventConfig,
    transport: Arc<dyn NodeTransport>,
    chain: Arc<DecoderChain>,
    policy: ResubscribePolicy,
    token: CancellationToken,
}

/// Why a single subscription attempt stopped
enum Outcome {
    Cancelled,
    Completed,
    Failed,
}

impl SubscriptionTask {
    async fn run(self) {
        let mut attempt = 0u32;
        loop {
            match self.stream_once().await {
                Outcome::Cancelled => {
                    debug!(key = %self.key, "Subscription cancelled");
                    return;
                }
                Outcome::Completed => {
                    info!(key = %self.key, "Block range exhausted, subscription complete");
                    return;
                }
                Outcome::Failed if attempt >= self.policy.max_attempts => {
                    error!(key = %self.key, attempts = attempt, "Subscription is inactive");
                    return;
                }
                Outcome::Failed => {
                    let delay = self.policy.backoff_delay(attempt);
                    attempt += 1;
                    warn!(
                        key = %self.key,
                        "Re-subscribing (attempt {}/{}), waiting {:?}",
                        attempt,
                        self.policy.max_attempts,
                        delay
                    );
                    tokio::select! {
                        _ = self.token.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn stream_once(&self) -> Outcome {
        let filter = LogFilter::for_event(&self.contract, &self.event);
        let bounded = matches!(filter.to_block, BlockTag::Number(_));

        let subscribed = tokio::select! {
            _ = self.token.cancelled() => return Outcome::Cancelled,
            result = self.transport.subscribe_logs(filter) => result,
        };
        let mut logs = match subscribed {
            Ok(logs) => logs,
            Err(e) => {
                error!(key = %self.key, error = %e, "Failed to subscribe");
                return Outcome::Failed;
            }
        };
        info!(key = %self.key, contract = %self.contract.name, "Subscription active");

        loop {
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Outcome::Cancelled,
                next = logs.next() => next,
            };

            match next {
                Some(Ok(log)) => {
                    self.chain.dispatch(&log, &self.contract, &self.event).await;
                }
                Some(Err(e)) => {
                    error!(key = %self.key, error = %e, "Subscription stream failed");
                    return Outcome::Failed;
                }
                None if bounded => return Outcome::Completed,
                None => {
                    warn!(key = %self.key, "Subscription stream ended");
                    return Outcome::Failed;
                }
            }
        }
    }
}
