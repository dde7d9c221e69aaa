//! Block Events Ingestor Library
//!
//! This crate provides components for subscribing to contract logs and new
//! blocks on a ledger node, decoding logs into typed events through a
//! priority-ordered decoder chain, and publishing them on an in-process bus.

pub mod block_watcher;
pub mod bus;
pub mod config;
pub mod decoder;
pub mod discovery;
pub mod events;
pub mod filter;
pub mod handlers;
pub mod registry;
pub mod service;
pub mod signatures;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use bus::{EventBus, EventHandler, HandlerError, HandlerId};
pub use config::{ConfigError, IngestorConfig};
pub use decoder::{DecodeError, DecoderChain, LogDecoder};
pub use events::{DecodedEvent, EventKind};
pub use registry::SubscriptionRegistry;
pub use service::Ingestor;
pub use transport::{AlloyTransport, NodeTransport, TransportError};
pub use types::{ContractConfig, EventConfig, RawBlockHeader, RawLogEntry, SubscriptionKey};
