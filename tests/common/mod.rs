//! Shared test fixtures: an in-memory node and a recording bus handler.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;

use blockevents_ingestor::bus::{EventHandler, HandlerError};
use blockevents_ingestor::filter::LogFilter;
use blockevents_ingestor::transport::{BlockStream, LogStream, NodeTransport, TransportError};
use blockevents_ingestor::{DecodedEvent, RawBlockHeader, RawLogEntry};

type LogSender = UnboundedSender<Result<RawLogEntry, TransportError>>;
type BlockSender = UnboundedSender<Result<RawBlockHeader, TransportError>>;

/// Node stand-in: every subscription is a channel the test pushes into
#[derive(Default)]
pub struct ChannelTransport {
    log_subscribers: Mutex<Vec<(LogFilter, LogSender)>>,
    block_subscribers: Mutex<Vec<BlockSender>>,
    blocks: Mutex<HashMap<u64, RawBlockHeader>>,
    log_subscriptions: AtomicUsize,
    block_subscriptions: AtomicUsize,
    block_lookups: AtomicUsize,
}

impl ChannelTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver a log to every open subscription whose filter matches.
    /// Returns the number of subscriptions reached.
    pub fn emit_log(&self, log: RawLogEntry) -> usize {
        let mut subscribers = self.log_subscribers.lock().unwrap();
        subscribers.retain(|(_, tx)| !tx.is_closed());
        subscribers
            .iter()
            .filter(|(filter, _)| filter.matches(&log.address, &log.topics))
            .filter(|(_, tx)| tx.unbounded_send(Ok(log.clone())).is_ok())
            .count()
    }

    /// Fail every open log subscription
    pub fn fail_logs(&self, error: TransportError) {
        for (_, tx) in self.log_subscribers.lock().unwrap().drain(..) {
            let _ = tx.unbounded_send(Err(error.clone()));
        }
    }

    pub fn emit_block(&self, header: RawBlockHeader) -> usize {
        let mut subscribers = self.block_subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.unbounded_send(Ok(header.clone())).is_ok());
        subscribers.len()
    }

    /// Make a block available to `get_block_by_number`
    pub fn insert_block(&self, header: RawBlockHeader) {
        self.blocks.lock().unwrap().insert(header.number, header);
    }

    pub fn log_subscriptions(&self) -> usize {
        self.log_subscriptions.load(Ordering::SeqCst)
    }

    pub fn block_subscriptions(&self) -> usize {
        self.block_subscriptions.load(Ordering::SeqCst)
    }

    pub fn block_lookups(&self) -> usize {
        self.block_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeTransport for ChannelTransport {
    async fn subscribe_logs(&self, filter: LogFilter) -> Result<LogStream, TransportError> {
        let (tx, rx) = unbounded();
        self.log_subscribers.lock().unwrap().push((filter, tx));
        self.log_subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(rx.boxed())
    }

    async fn subscribe_blocks(&self) -> Result<BlockStream, TransportError> {
        let (tx, rx) = unbounded();
        self.block_subscribers.lock().unwrap().push(tx);
        self.block_subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(rx.boxed())
    }

    async fn get_block_by_number(&self, number: u64) -> Result<RawBlockHeader, TransportError> {
        self.block_lookups.fetch_add(1, Ordering::SeqCst);
        self.blocks
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .ok_or(TransportError::BlockNotFound(number))
    }
}

/// Bus handler that keeps every event it receives
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<DecodedEvent>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<DecodedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl EventHandler for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Poll `condition` until it holds, panicking after two seconds
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within 2s");
}

pub fn word(value: u64) -> [u8; 32] {
    U256::from(value).to_be_bytes::<32>()
}

pub fn log_entry(address: Address, topics: Vec<B256>, data: Vec<[u8; 32]>, block_number: u64) -> RawLogEntry {
    RawLogEntry {
        address,
        topics,
        data: Bytes::from(data.concat()),
        transaction_hash: B256::repeat_byte(0xab),
        block_number,
        log_index: 0,
        block_timestamp: Some(1_703_000_000),
    }
}

pub fn block_header(number: u64, transactions: Vec<B256>) -> RawBlockHeader {
    RawBlockHeader {
        number,
        hash: B256::with_last_byte(number as u8),
        parent_hash: B256::with_last_byte(number.saturating_sub(1) as u8),
        gas_limit: 30_000_000,
        gas_used: 21_000 * transactions.len() as u64,
        timestamp: 1_703_000_000 + number * 12,
        miner: Address::ZERO,
        transactions,
    }
}
