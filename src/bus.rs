//! Event Bus
//!
//! In-process publish/subscribe for decoded events. Handlers register for one
//! event kind or for all kinds and are called synchronously, in registration
//! order, on the publishing task. A failing or panicking handler is logged and
//! skipped; it never affects other handlers or the publisher.
//!
//! The handler table is copied out under a read lock before delivery, so
//! handlers may subscribe or unsubscribe while a publish is in progress.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, error};

use crate::events::{DecodedEvent, EventKind};

/// Error returned by a handler that could not process an event
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// A consumer of published events
pub trait EventHandler: Send + Sync {
    /// Name used in failure logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError>;
}

/// Adapts a closure into an [`EventHandler`]
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&DecodedEvent) -> Result<(), HandlerError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&DecodedEvent) -> Result<(), HandlerError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        (self.f)(event)
    }
}

/// Identifies one subscription on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

#[derive(Clone)]
struct Registration {
    id: HandlerId,
    handler: Arc<dyn EventHandler>,
}

#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<Registration>>>,
    next_id: AtomicU64,
    published: AtomicU64,
    handler_failures: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind
    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> HandlerId {
        self.subscribe_kinds(&[kind], handler)
    }

    /// Register a handler for every event kind
    pub fn subscribe_all(&self, handler: Arc<dyn EventHandler>) -> HandlerId {
        self.subscribe_kinds(&EventKind::ALL, handler)
    }

    /// Register a closure for one event kind
    pub fn on<F>(&self, kind: EventKind, f: F) -> HandlerId
    where
        F: Fn(&DecodedEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe(kind, Arc::new(FnHandler::new(kind.name(), f)))
    }

    /// Register a closure for every event kind
    pub fn on_all<F>(&self, f: F) -> HandlerId
    where
        F: Fn(&DecodedEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe_all(Arc::new(FnHandler::new("all", f)))
    }

    fn subscribe_kinds(&self, kinds: &[EventKind], handler: Arc<dyn EventHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.handlers.write();
        for kind in kinds {
            handlers.entry(*kind).or_default().push(Registration {
                id,
                handler: handler.clone(),
            });
        }
        debug!(%id, handler = handler.name(), kinds = kinds.len(), "Handler subscribed");
        id
    }

    /// Remove a handler from every kind it was registered for.
    /// Returns false when the id is unknown.
    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut removed = false;
        let mut handlers = self.handlers.write();
        for registrations in handlers.values_mut() {
            let before = registrations.len();
            registrations.retain(|r| r.id != id);
            removed |= registrations.len() != before;
        }
        handlers.retain(|_, registrations| !registrations.is_empty());
        if removed {
            debug!(%id, "Handler unsubscribed");
        }
        removed
    }

    /// Deliver an event to every handler registered for its kind.
    /// Returns the number of handlers that accepted it.
    pub fn publish(&self, event: &DecodedEvent) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        let kind = event.kind();
        let snapshot: Vec<Registration> = self
            .handlers
            .read()
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for registration in &snapshot {
            let handler = &registration.handler;
            match catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    self.handler_failures.fetch_add(1, Ordering::Relaxed);
                    error!(handler = handler.name(), %kind, error = %e, "Event handler failed");
                }
                Err(panic) => {
                    self.handler_failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        handler = handler.name(),
                        %kind,
                        panic = panic_message(&*panic),
                        "Event handler panicked"
                    );
                }
            }
        }
        delivered
    }

    /// Number of handlers that would receive an event of `kind`
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }

    /// Total events published since creation
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Total handler failures and panics since creation
    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{timestamp_from_secs, BlockEvent};
    use alloy::primitives::{Address, B256};
    use parking_lot::Mutex;

    fn block(number: u64) -> DecodedEvent {
        DecodedEvent::Block(BlockEvent {
            block_number: number,
            block_hash: B256::ZERO,
            parent_hash: B256::ZERO,
            gas_limit: 0,
            gas_used: 0,
            timestamp: timestamp_from_secs(0),
            miner: Address::ZERO,
            transaction_hashes: vec![],
            transaction_count: 0,
        })
    }

    fn recorder(bus: &EventBus, kind: EventKind, label: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> HandlerId {
        let log = log.clone();
        bus.on(kind, move |_| {
            log.lock().push(label);
            Ok(())
        })
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        recorder(&bus, EventKind::Block, "first", &seen);
        let all_seen = seen.clone();
        bus.on_all(move |_| {
            all_seen.lock().push("all");
            Ok(())
        });
        recorder(&bus, EventKind::Block, "last", &seen);

        assert_eq!(bus.publish(&block(1)), 3);
        assert_eq!(*seen.lock(), vec!["first", "all", "last"]);
    }

    #[test]
    fn test_only_matching_kind_is_called() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        recorder(&bus, EventKind::AmmSwap, "swap", &seen);
        assert_eq!(bus.publish(&block(1)), 0);
        assert!(seen.lock().is_empty());
        assert_eq!(bus.published(), 1);
    }

    #[test]
    fn test_failing_handler_does_not_stop_delivery() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.on(EventKind::Block, |_| Err(HandlerError::failed("sink unavailable")));
        bus.on(EventKind::Block, |_| panic!("handler bug"));
        recorder(&bus, EventKind::Block, "survivor", &seen);

        assert_eq!(bus.publish(&block(1)), 1);
        assert_eq!(*seen.lock(), vec!["survivor"]);
        assert_eq!(bus.handler_failures(), 2);
    }

    #[test]
    fn test_unsubscribe_removes_from_all_kinds() {
        let bus = EventBus::new();
        let id = bus.on_all(|_| Ok(()));
        assert_eq!(bus.handler_count(EventKind::Generic), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        for kind in EventKind::ALL {
            assert_eq!(bus.handler_count(kind), 0);
        }
    }

    #[test]
    fn test_handler_may_subscribe_during_publish() {
        let bus = Arc::new(EventBus::new());
        let inner = bus.clone();
        bus.on(EventKind::Block, move |_| {
            inner.on(EventKind::Block, |_| Ok(()));
            Ok(())
        });

        assert_eq!(bus.publish(&block(1)), 1);
        assert_eq!(bus.handler_count(EventKind::Block), 2);
    }

    #[test]
    fn test_concurrent_publish_and_subscribe() {
        let bus = Arc::new(EventBus::new());
        let threads: Vec<_> = (0..4)
            .map(|i| {
                let bus = bus.clone();
                std::thread::spawn(move || {
                    for n in 0..100 {
                        if i % 2 == 0 {
                            let id = bus.on(EventKind::Block, |_| Ok(()));
                            bus.unsubscribe(id);
                        } else {
                            bus.publish(&block(n));
                        }
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(bus.published(), 200);
        assert_eq!(bus.handler_count(EventKind::Block), 0);
    }
}
