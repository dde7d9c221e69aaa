//! Block timestamp resolution for decoded logs.

use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use tracing::warn;

use crate::events::timestamp_from_secs;
use crate::transport::NodeTransport;
use crate::types::RawLogEntry;

/// Default number of block timestamps kept in memory
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Resolves the block timestamp of a log.
///
/// Uses the timestamp carried on the log when the node provides one, otherwise
/// looks the block up by number. Lookups are kept in an LRU cache so several
/// logs from the same block cost one round trip. A failed lookup resolves to "now".
pub struct TimestampResolver {
    transport: Arc<dyn NodeTransport>,
    cache: Mutex<LruCache<u64, u64>>,
}

impl TimestampResolver {
    pub fn new(transport: Arc<dyn NodeTransport>) -> Self {
        Self::with_capacity(transport, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(transport: Arc<dyn NodeTransport>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            transport,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn resolve(&self, log: &RawLogEntry) -> DateTime<Utc> {
        if let Some(secs) = log.block_timestamp {
            return timestamp_from_secs(secs);
        }
        if let Some(secs) = self.cached(log.block_number) {
            return timestamp_from_secs(secs);
        }

        match self.transport.get_block_by_number(log.block_number).await {
            Ok(header) => {
                self.remember(header.number, header.timestamp);
                timestamp_from_secs(header.timestamp)
            }
            Err(e) => {
                warn!(block = log.block_number, error = %e, "Block lookup failed, using current time");
                Utc::now()
            }
        }
    }

    fn cached(&self, block_number: u64) -> Option<u64> {
        self.cache.lock().get(&block_number).copied()
    }

    fn remember(&self, block_number: u64, timestamp: u64) {
        self.cache.lock().put(block_number, timestamp);
    }

    /// Number of cached block timestamps
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}
