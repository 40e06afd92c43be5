use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use platform_types::{Event, ProcessedEvent, Progress};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tracing::instrument;

use utils::config::RpcEndpointConfig;
use utils::error::StoreError;
use utils::storage::Store;
use utils::telemetry::IndexerMetrics;

use crate::event_bus::EventBus;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("no healthy rpc endpoint available")]
    NoHealthyEndpoint,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// One ordered block of chain activity as delivered by an `RpcSource`.
#[derive(Debug, Clone)]
pub struct ChainBlock {
    pub height: u64,
    pub hash: String,
    /// Events in this block, already ordered by `(tx_index, log_index)`.
    pub events: Vec<Event>,
}

/// Abstracts a single RPC endpoint. Implementations live outside this
/// crate; tests use an in-memory fake chain.
#[async_trait]
pub trait RpcSource: Send + Sync {
    fn endpoint_url(&self) -> &str;
    async fn head(&self) -> Result<u64, String>;
    async fn block(&self, height: u64) -> Result<ChainBlock, String>;
    async fn health_check(&self) -> bool;
}

struct Endpoint {
    source: Arc<dyn RpcSource>,
    config: RpcEndpointConfig,
    healthy: std::sync::atomic::AtomicBool,
}

/// Polls a prioritized list of RPC endpoints for new blocks, applies a
/// confirmation depth before indexing, and publishes each event to the bus
/// exactly once (idempotent on `(chain_id, tx_hash, log_index)`).
pub struct ChainIndexer<S: Store<ProcessedEvent>> {
    chain_id: String,
    endpoints: Vec<Endpoint>,
    confirmation_depth: u64,
    poll_interval: Duration,
    processed: Arc<S>,
    progress: RwLock<Progress>,
    bus: Arc<EventBus>,
    metrics: Arc<IndexerMetrics>,
    account_id: platform_types::AccountId,
}

impl<S: Store<ProcessedEvent> + 'static> ChainIndexer<S> {
    pub fn new(
        chain_id: impl Into<String>,
        sources: Vec<(Arc<dyn RpcSource>, RpcEndpointConfig)>,
        confirmation_depth: u64,
        poll_interval: Duration,
        processed: Arc<S>,
        bus: Arc<EventBus>,
        metrics: Arc<IndexerMetrics>,
        account_id: platform_types::AccountId,
    ) -> Arc<Self> {
        let mut endpoints: Vec<Endpoint> = sources
            .into_iter()
            .map(|(source, config)| Endpoint {
                source,
                config,
                healthy: std::sync::atomic::AtomicBool::new(true),
            })
            .collect();
        endpoints.sort_by(|a, b| b.config.priority.cmp(&a.config.priority));

        Arc::new(Self {
            chain_id: chain_id.into(),
            endpoints,
            confirmation_depth,
            poll_interval,
            processed,
            progress: RwLock::new(Progress::default()),
            bus,
            metrics,
            account_id,
        })
    }

    /// Runs the poll loop until `kill` fires. Every `poll_interval`, fetches
    /// the safe head across the first healthy endpoint, indexes any new
    /// blocks up to that height strictly in order, and publishes each
    /// event's topic to the bus.
    #[instrument(skip(self, kill), fields(subsys = "ChainIndexer", chain_id = %self.chain_id))]
    pub async fn run(self: Arc<Self>, mut kill: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = kill.recv() => return,
                _ = tokio::time::sleep(self.poll_interval) => {
                    if let Err(err) = self.poll_once().await {
                        tracing::warn!(chain_id = %self.chain_id, error = %err, "indexer poll failed");
                    }
                }
            }
        }
    }

    async fn poll_once(&self) -> Result<(), IndexerError> {
        let source = self.healthy_source().await?;
        let head = source.head().await.map_err(|_| IndexerError::NoHealthyEndpoint)?;
        let safe_head = Progress::safe_head(head, self.confirmation_depth);
        let start = self.progress.read().await.last_processed_block + 1;

        for height in start..=safe_head {
            let block = source
                .block(height)
                .await
                .map_err(|_| IndexerError::NoHealthyEndpoint)?;
            self.index_block(&block).await?;
            let mut progress = self.progress.write().await;
            progress.last_processed_block = block.height;
            progress.last_block_hash = Some(block.hash.clone());
            progress.last_processed_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn index_block(&self, block: &ChainBlock) -> Result<(), IndexerError> {
        for event in &block.events {
            let Some((chain_id, tx_hash, log_index)) = event.dedup_key() else {
                continue;
            };
            let key = uuid::Uuid::new_v5(
                &uuid::Uuid::NAMESPACE_OID,
                format!("{chain_id}:{tx_hash}:{log_index}").as_bytes(),
            );
            if self.processed.get(&self.account_id, key)?.is_some() {
                continue;
            }

            self.processed.put(
                &self.account_id,
                key,
                ProcessedEvent {
                    chain_id,
                    tx_hash,
                    log_index,
                    block_height: block.height,
                    processed_at: chrono::Utc::now(),
                },
            )?;

            if let Err(err) = self.bus.publish(&event.topic, event.payload.clone()).await {
                tracing::warn!(topic = %event.topic, error = %err, "indexer publish failed");
            } else {
                self.metrics.events_published_total.inc();
            }
        }
        self.metrics.blocks_processed_total.inc();
        Ok(())
    }

    /// Returns the highest-priority endpoint currently marked healthy,
    /// failing over (and re-probing) on failure. Health is revalidated at
    /// most every 30s per endpoint by the caller's poll cadence.
    async fn healthy_source(&self) -> Result<Arc<dyn RpcSource>, IndexerError> {
        for endpoint in &self.endpoints {
            if endpoint.healthy.load(Ordering::SeqCst) {
                return Ok(endpoint.source.clone());
            }
        }
        // Every endpoint marked unhealthy: re-probe from highest priority.
        for endpoint in &self.endpoints {
            if endpoint.source.health_check().await {
                endpoint.healthy.store(true, Ordering::SeqCst);
                self.metrics.rpc_failovers_total.inc();
                return Ok(endpoint.source.clone());
            }
        }
        Err(IndexerError::NoHealthyEndpoint)
    }

    /// Marks `url` unhealthy, forcing the next poll to fail over.
    pub fn mark_unhealthy(&self, url: &str) {
        for endpoint in &self.endpoints {
            if endpoint.source.endpoint_url() == url {
                endpoint.healthy.store(false, Ordering::SeqCst);
            }
        }
    }

    /// `POST /replay`: rewinds the cursor to `start_block` so the next poll
    /// re-indexes from there. Already-processed events are skipped by the
    /// `ProcessedEvent` dedup check, so replay is safe to re-run.
    pub async fn replay(&self, start_block: u64) {
        let mut progress = self.progress.write().await;
        progress.last_processed_block = start_block.saturating_sub(1);
    }

    pub async fn progress(&self) -> Progress {
        self.progress.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use utils::storage::InMemoryStore;
    use utils::telemetry::Metrics;

    struct FakeSource {
        url: String,
        blocks: StdMutex<Vec<ChainBlock>>,
        healthy: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl RpcSource for FakeSource {
        fn endpoint_url(&self) -> &str {
            &self.url
        }
        async fn head(&self) -> Result<u64, String> {
            Ok(self.blocks.lock().unwrap().len() as u64)
        }
        async fn block(&self, height: u64) -> Result<ChainBlock, String> {
            self.blocks
                .lock()
                .unwrap()
                .get((height - 1) as usize)
                .cloned()
                .ok_or_else(|| "no such block".to_string())
        }
        async fn health_check(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }
    }

    fn event_with_key(chain_id: &str, tx_hash: &str, log_index: u64) -> Event {
        let mut e = Event::new("oracle.price.updated", serde_json::json!({"n": 1}));
        e.chain_id = Some(chain_id.to_string());
        e.tx_hash = Some(tx_hash.to_string());
        e.log_index = Some(log_index);
        e
    }

    fn indexer(
        blocks: Vec<ChainBlock>,
        confirmation_depth: u64,
    ) -> (Arc<ChainIndexer<InMemoryStore<ProcessedEvent>>>, Arc<EventBus>) {
        let source = Arc::new(FakeSource {
            url: "https://rpc-a".to_string(),
            blocks: StdMutex::new(blocks),
            healthy: std::sync::atomic::AtomicBool::new(true),
        });
        let bus = EventBus::new(Metrics::new().bus);
        let indexer = ChainIndexer::new(
            "chain-a",
            vec![(source, RpcEndpointConfig { url: "https://rpc-a".into(), priority: 10 })],
            confirmation_depth,
            Duration::from_millis(10),
            Arc::new(InMemoryStore::new()),
            bus.clone(),
            Arc::new(Metrics::new().indexer),
            platform_types::AccountId::new(),
        );
        (indexer, bus)
    }

    #[tokio::test]
    async fn poll_once_indexes_only_up_to_safe_head() {
        let blocks = vec![
            ChainBlock { height: 1, hash: "h1".into(), events: vec![event_with_key("chain-a", "tx1", 0)] },
            ChainBlock { height: 2, hash: "h2".into(), events: vec![event_with_key("chain-a", "tx2", 0)] },
            ChainBlock { height: 3, hash: "h3".into(), events: vec![event_with_key("chain-a", "tx3", 0)] },
        ];
        let (indexer, _bus) = indexer(blocks, 2);
        indexer.poll_once().await.unwrap();
        assert_eq!(indexer.progress().await.last_processed_block, 1);
    }

    #[tokio::test]
    async fn duplicate_dedup_key_is_indexed_exactly_once() {
        let blocks = vec![ChainBlock {
            height: 1,
            hash: "h1".into(),
            events: vec![event_with_key("chain-a", "tx1", 0), event_with_key("chain-a", "tx1", 0)],
        }];
        let (indexer, bus) = indexer(blocks, 0);
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = received.clone();
        bus.subscribe(
            "oracle.price.updated",
            Arc::new(move |_payload| {
                let received = received_clone.clone();
                Box::pin(async move {
                    received.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );

        indexer.poll_once().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn replay_rewinds_cursor_for_next_poll() {
        let blocks = vec![
            ChainBlock { height: 1, hash: "h1".into(), events: vec![] },
            ChainBlock { height: 2, hash: "h2".into(), events: vec![] },
        ];
        let (indexer, _bus) = indexer(blocks, 0);
        indexer.poll_once().await.unwrap();
        assert_eq!(indexer.progress().await.last_processed_block, 2);

        indexer.replay(1).await;
        assert_eq!(indexer.progress().await.last_processed_block, 0);
    }

    #[tokio::test]
    async fn unhealthy_endpoint_triggers_failover_metric_on_reprobe() {
        let (indexer, _bus) = indexer(vec![], 0);
        indexer.mark_unhealthy("https://rpc-a");
        // FakeSource.health_check returns true regardless, so failover succeeds.
        let source = indexer.healthy_source().await.unwrap();
        assert_eq!(source.endpoint_url(), "https://rpc-a");
    }
}
