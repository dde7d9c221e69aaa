//! Node Transport
//!
//! Connection to the ledger node. Requests (block lookups, log polling) go
//! over the node URL. Live subscriptions use a separate streaming endpoint,
//! either a WebSocket URL or an IPC socket path.
//!
//! Connection policy:
//! * no streaming endpoint configured: log subscriptions are served by
//!   polling and block streaming is disabled
//! * streaming endpoint unreachable within the connect timeout: log and block
//!   subscriptions both degrade to polling over the request transport
//! * streaming endpoint connected: logs and block headers are pushed by the node
//!
//! A log filter with a numeric `fromBlock` or `toBlock` is always served by
//! polling the request transport, since a node subscription only pushes new
//! logs. Each poll covers at most `max_block_range` blocks.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::B256;
use alloy::providers::{DynProvider, IpcConnect, Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{Block, Log};
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tokio::time::{interval, timeout, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::TransportSettings;
use crate::filter::{BlockTag, LogFilter};
use crate::types::{RawBlockHeader, RawLogEntry};

/// Lazily produced, infinite sequence of raw logs
pub type LogStream = BoxStream<'static, Result<RawLogEntry, TransportError>>;

/// Lazily produced, infinite sequence of block headers
pub type BlockStream = BoxStream<'static, Result<RawBlockHeader, TransportError>>;

/// Errors that can occur talking to the node
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("Connection timeout after {0}ms")]
    Timeout(u64),

    #[error("Block {0} not found")]
    BlockNotFound(u64),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("IPC socket not found at path: {0}")]
    SocketNotFound(String),

    #[error("Block streaming is disabled")]
    StreamingDisabled,

    #[error("RPC error: {0}")]
    Rpc(String),
}

/// Operations the rest of the engine needs from a node.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeTransport: Send + Sync {
    /// Matching logs, in the order the node emits them
    async fn subscribe_logs(&self, filter: LogFilter) -> Result<LogStream, TransportError>;

    /// New block headers with transactions flattened to hashes
    async fn subscribe_blocks(&self) -> Result<BlockStream, TransportError>;

    async fn get_block_by_number(&self, number: u64) -> Result<RawBlockHeader, TransportError>;
}

/// State of the streaming connection
#[derive(Clone)]
pub enum StreamingMode {
    /// No streaming endpoint configured
    Disabled,
    Connected(DynProvider),
    /// Streaming endpoint configured but unreachable, polling instead
    Degraded,
}

impl std::fmt::Debug for StreamingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StreamingMode::Disabled => "Disabled",
            StreamingMode::Connected(_) => "Connected",
            StreamingMode::Degraded => "Degraded",
        })
    }
}

/// How log subscriptions are served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    Subscription,
    Polling,
}

/// [`NodeTransport`] backed by alloy providers
pub struct AlloyTransport {
    requests: DynProvider,
    streaming: StreamingMode,
    poll_interval: Duration,
    max_block_range: u64,
}

impl AlloyTransport {
    /// Connect the request transport, then try the streaming endpoint.
    ///
    /// Only a bad node URL is an error. A missing or unreachable streaming
    /// endpoint is logged and the transport carries on without it.
    pub async fn connect(
        node_url: &str,
        streaming_url: Option<&str>,
        settings: &TransportSettings,
    ) -> Result<Self, TransportError> {
        let requests = Self::connect_fallback(node_url).await?;

        let streaming = match streaming_url.map(str::trim).filter(|url| !url.is_empty()) {
            None => {
                info!("No streaming endpoint configured, block streaming disabled");
                StreamingMode::Disabled
            }
            Some(url) => match Self::connect_streaming(url, settings.connect_timeout()).await {
                Ok(provider) => StreamingMode::Connected(provider),
                Err(e) => {
                    warn!(endpoint = %url, error = %e, "Streaming connection failed, falling back to polling");
                    StreamingMode::Degraded
                }
            },
        };

        Ok(Self {
            requests,
            streaming,
            poll_interval: settings.poll_interval(),
            max_block_range: settings.max_block_range(),
        })
    }

    /// Connect to a WebSocket URL or IPC socket path within `connect_timeout`
    pub async fn connect_streaming(url: &str, connect_timeout: Duration) -> Result<DynProvider, TransportError> {
        let timeout_ms = connect_timeout.as_millis() as u64;

        let provider = if url.starts_with("ws://") || url.starts_with("wss://") {
            info!(endpoint = %url, "Connecting to WebSocket endpoint");
            let connecting = ProviderBuilder::new().connect_ws(WsConnect::new(url));
            timeout(connect_timeout, connecting)
                .await
                .map_err(|_| TransportError::Timeout(timeout_ms))?
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?
                .erased()
        } else {
            let path = expand_path(url);
            if !Path::new(&path).exists() {
                return Err(TransportError::SocketNotFound(path));
            }
            info!(path = %path, "Connecting to IPC socket");
            let connecting = ProviderBuilder::new().connect_ipc(IpcConnect::new(path));
            timeout(connect_timeout, connecting)
                .await
                .map_err(|_| TransportError::Timeout(timeout_ms))?
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?
                .erased()
        };

        info!(endpoint = %url, "Streaming connection established");
        Ok(provider)
    }

    /// Connect the request/response transport. HTTP endpoints connect lazily.
    pub async fn connect_fallback(url: &str) -> Result<DynProvider, TransportError> {
        if url.trim().is_empty() {
            return Err(TransportError::InvalidEndpoint("node URL cannot be empty".to_string()));
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            let parsed = url
                .parse::<Url>()
                .map_err(|e| TransportError::InvalidEndpoint(format!("{url}: {e}")))?;
            return Ok(ProviderBuilder::new().connect_http(parsed).erased());
        }

        ProviderBuilder::new()
            .connect(url)
            .await
            .map(|provider| provider.erased())
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))
    }

    pub fn mode(&self) -> &StreamingMode {
        &self.streaming
    }

    pub fn log_source(&self) -> LogSource {
        match self.streaming {
            StreamingMode::Connected(_) => LogSource::Subscription,
            StreamingMode::Disabled | StreamingMode::Degraded => LogSource::Polling,
        }
    }

    /// How a particular filter is served. Bounded filters are always polled.
    pub fn log_source_for(&self, filter: &LogFilter) -> LogSource {
        if filter.is_bounded() {
            LogSource::Polling
        } else {
            self.log_source()
        }
    }

    async fn fetch_block(provider: &DynProvider, number: u64) -> Result<RawBlockHeader, TransportError> {
        provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await
            .map_err(|e| TransportError::Rpc(e.to_string()))?
            .map(raw_block)
            .ok_or(TransportError::BlockNotFound(number))
    }
}

#[async_trait]
impl NodeTransport for AlloyTransport {
    async fn subscribe_logs(&self, filter: LogFilter) -> Result<LogStream, TransportError> {
        match (&self.streaming, self.log_source_for(&filter)) {
            (StreamingMode::Connected(provider), LogSource::Subscription) => {
                let subscription = provider
                    .subscribe_logs(&filter.to_rpc())
                    .await
                    .map_err(|e| TransportError::SubscriptionFailed(e.to_string()))?;
                debug!(%filter, "Log subscription opened");
                let logs = subscription
                    .into_stream()
                    .filter_map(|log| async move { raw_log(log).map(Ok::<_, TransportError>) });
                Ok(logs.boxed())
            }
            _ => {
                debug!(%filter, interval = ?self.poll_interval, "Polling for logs");
                Ok(poll_logs(
                    self.requests.clone(),
                    filter,
                    self.poll_interval,
                    self.max_block_range,
                ))
            }
        }
    }

    async fn subscribe_blocks(&self) -> Result<BlockStream, TransportError> {
        match &self.streaming {
            StreamingMode::Disabled => Err(TransportError::StreamingDisabled),
            StreamingMode::Connected(provider) => {
                let subscription = provider
                    .subscribe_blocks()
                    .await
                    .map_err(|e| TransportError::SubscriptionFailed(e.to_string()))?;
                let requests = self.requests.clone();
                // headers carry no transactions, fetch the block for its hashes
                let blocks = subscription.into_stream().then(move |header| {
                    let requests = requests.clone();
                    async move { Self::fetch_block(&requests, header.number).await }
                });
                Ok(blocks.boxed())
            }
            StreamingMode::Degraded => {
                warn!(interval = ?self.poll_interval, "Block streaming unavailable, polling for new blocks");
                Ok(poll_blocks(self.requests.clone(), self.poll_interval))
            }
        }
    }

    async fn get_block_by_number(&self, number: u64) -> Result<RawBlockHeader, TransportError> {
        Self::fetch_block(&self.requests, number).await
    }
}

/// Map an RPC log. Pending and reorged-out logs are dropped.
pub fn raw_log(log: Log) -> Option<RawLogEntry> {
    if log.removed {
        debug!(tx = ?log.transaction_hash, "Skipping removed log");
        return None;
    }
    Some(RawLogEntry {
        address: log.inner.address,
        topics: log.inner.data.topics().to_vec(),
        data: log.inner.data.data.clone(),
        transaction_hash: log.transaction_hash?,
        block_number: log.block_number?,
        log_index: log.log_index?,
        block_timestamp: log.block_timestamp,
    })
}

/// Map an RPC block, flattening its transactions to hashes
pub fn raw_block(block: Block) -> RawBlockHeader {
    let transactions: Vec<B256> = block.transactions.hashes().collect();
    let header = block.header;
    RawBlockHeader {
        number: header.number,
        hash: header.hash,
        parent_hash: header.parent_hash,
        gas_limit: header.gas_limit,
        gas_used: header.gas_used,
        timestamp: header.timestamp,
        miner: header.beneficiary,
        transactions,
    }
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

struct LogPoller {
    provider: DynProvider,
    filter: LogFilter,
    max_block_range: u64,
    next_block: Option<u64>,
    /// Set once a poll reached the head (or the end of the range)
    caught_up: bool,
    ticker: Interval,
    pending: VecDeque<RawLogEntry>,
}

impl LogPoller {
    fn finished(&self) -> bool {
        let BlockTag::Number(end) = self.filter.to_block else {
            return false;
        };
        match (self.next_block, self.filter.from_block) {
            (Some(next), _) | (None, BlockTag::Number(next)) => next > end,
            (None, BlockTag::Latest) => false,
        }
    }

    async fn poll(&mut self) -> Result<(), TransportError> {
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| TransportError::Rpc(e.to_string()))?;

        let from = match (self.next_block, self.filter.from_block) {
            (Some(next), _) => next,
            (None, BlockTag::Number(n)) => n,
            (None, BlockTag::Latest) => head,
        };
        let target = match self.filter.to_block {
            BlockTag::Number(end) => end.min(head),
            BlockTag::Latest => head,
        };
        let to = target.min(from.saturating_add(self.max_block_range - 1));
        if from > to {
            self.caught_up = true;
            return Ok(());
        }

        let range = self.filter.to_rpc().from_block(from).to_block(to);
        let logs = self
            .provider
            .get_logs(&range)
            .await
            .map_err(|e| TransportError::Rpc(e.to_string()))?;
        debug!(from, to, count = logs.len(), "Polled logs");

        self.pending.extend(logs.into_iter().filter_map(raw_log));
        self.next_block = Some(to + 1);
        self.caught_up = to >= target;
        Ok(())
    }
}

/// Poll `eth_getLogs` over consecutive block ranges of at most
/// `max_block_range` blocks. Ends once a bounded `to_block` has been covered.
fn poll_logs(provider: DynProvider, filter: LogFilter, period: Duration, max_block_range: u64) -> LogStream {
    let poller = LogPoller {
        provider,
        filter,
        max_block_range: max_block_range.max(1),
        next_block: None,
        caught_up: true,
        ticker: ticker(period),
        pending: VecDeque::new(),
    };

    stream::unfold(poller, |mut poller| async move {
        loop {
            if let Some(log) = poller.pending.pop_front() {
                return Some((Ok(log), poller));
            }
            if poller.finished() {
                return None;
            }
            // catching up on a backlog does not wait for the next tick
            if poller.caught_up {
                poller.ticker.tick().await;
            }
            if let Err(e) = poller.poll().await {
                return Some((Err(e), poller));
            }
        }
    })
    .boxed()
}

struct BlockPoller {
    provider: DynProvider,
    last_seen: Option<u64>,
    ticker: Interval,
    pending: VecDeque<u64>,
}

/// Poll the chain head and fetch every block not yet seen, oldest first
fn poll_blocks(provider: DynProvider, period: Duration) -> BlockStream {
    let poller = BlockPoller {
        provider,
        last_seen: None,
        ticker: ticker(period),
        pending: VecDeque::new(),
    };

    stream::unfold(poller, |mut poller| async move {
        loop {
            if let Some(number) = poller.pending.pop_front() {
                let block = AlloyTransport::fetch_block(&poller.provider, number).await;
                return Some((block, poller));
            }
            poller.ticker.tick().await;
            match poller.provider.get_block_number().await {
                Ok(head) => {
                    let first = poller.last_seen.map_or(head, |seen| seen + 1);
                    poller.pending.extend(first..=head);
                    poller.last_seen = Some(head.max(poller.last_seen.unwrap_or(head)));
                }
                Err(e) => return Some((Err(TransportError::Rpc(e.to_string())), poller)),
            }
        }
    })
    .boxed()
}

/// Expand ~ to home directory in path
pub fn expand_path(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return path.replacen("~", &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
