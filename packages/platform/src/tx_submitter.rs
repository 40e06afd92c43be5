use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use platform_types::{
    AccountId, SubmissionEnvelope, SubmissionPriority, SubmissionRequest, SubmissionStatus,
};
use thiserror::Error;
use tokio::sync::{oneshot, Mutex, Notify};
use tracing::instrument;
use uuid::Uuid;

use utils::error::StoreError;
use utils::storage::Store;
use utils::telemetry::SubmissionMetrics;

/// Namespace for deriving a deterministic envelope id from
/// `(account_id, request_id)`, so re-submitting the same `request_id`
/// always resolves to the same stored envelope.
const REQUEST_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x9a, 0x1e, 0x4c, 0x77, 0x2f, 0x3b, 0x4d, 0x9e, 0xae, 0x61, 0x0e, 0x3d, 0x2b, 0x71, 0x5c, 0x44,
]);

fn envelope_id(account_id: &AccountId, request_id: &str) -> Uuid {
    let name = format!("{}:{}", account_id, request_id);
    Uuid::new_v5(&REQUEST_ID_NAMESPACE, name.as_bytes())
}

#[derive(Debug, Error, Clone)]
pub enum SubmitterError {
    #[error("submission not found")]
    NotFound,
    #[error("timed out waiting for confirmation")]
    Timeout,
    #[error("upstream chain error: {0}")]
    Upstream(String),
}

impl From<StoreError> for SubmitterError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => SubmitterError::NotFound,
            other => SubmitterError::Upstream(other.to_string()),
        }
    }
}

/// The chain-facing half of submission: actually broadcasting a signed
/// payload and polling its confirmation depth. Implementations live outside
/// this crate; tests use an in-memory fake.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn broadcast(&self, chain_id: &str, payload: &serde_json::Value) -> Result<String, String>;
    /// Returns the number of confirming blocks observed for `tx_hash`, or
    /// `None` if it isn't visible on-chain yet (including after a reorg).
    async fn confirmation_depth(&self, chain_id: &str, tx_hash: &str) -> Result<Option<u64>, String>;
}

struct Queued {
    priority: SubmissionPriority,
    sequence: u64,
    request: SubmissionRequest,
    reply: oneshot::Sender<Result<SubmissionEnvelope, SubmitterError>>,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}
impl Eq for Queued {}
impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; within a priority tier, earlier-enqueued
        // requests must run first, so sequence compares in reverse.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct AccountQueue {
    heap: Mutex<BinaryHeap<Queued>>,
    notify: Notify,
}

/// Serializes transaction submission per `signing_account`, persists the
/// envelope before signing/broadcasting (restart-safe), and resolves
/// confirmation by polling `confirmation_depth` against the configured
/// `confirmation_depth` threshold, resubmitting on reorg up to a bound.
pub struct TxSubmitter<S: Store<SubmissionEnvelope>> {
    store: Arc<S>,
    client: Arc<dyn ChainClient>,
    queues: tokio::sync::RwLock<HashMap<String, Arc<AccountQueue>>>,
    sequence: std::sync::atomic::AtomicU64,
    confirmation_depth: u64,
    max_resubmits: u32,
    metrics: Arc<SubmissionMetrics>,
}

impl<S: Store<SubmissionEnvelope> + 'static> TxSubmitter<S> {
    pub fn new(
        store: Arc<S>,
        client: Arc<dyn ChainClient>,
        confirmation_depth: u64,
        max_resubmits: u32,
        metrics: Arc<SubmissionMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            client,
            queues: tokio::sync::RwLock::new(HashMap::new()),
            sequence: std::sync::atomic::AtomicU64::new(0),
            confirmation_depth,
            max_resubmits,
            metrics,
        })
    }

    /// Submits `request`. Unless `wait_for_confirmation` is set, returns the
    /// freshly persisted, still-`queued` envelope immediately after it's
    /// handed to the signing account's queue, without waiting for broadcast.
    /// When `wait_for_confirmation` is set, blocks until the envelope is
    /// confirmed or the request times out. Two calls with the same
    /// `request_id` for the same account resolve to the same envelope
    /// without broadcasting twice.
    #[instrument(skip(self, request), fields(subsys = "TxSubmitter", request_id = %request.request_id))]
    pub async fn submit(
        self: &Arc<Self>,
        request: SubmissionRequest,
    ) -> Result<SubmissionEnvelope, SubmitterError> {
        let id = envelope_id(&request.account_id, &request.request_id);

        if let Some(existing) = self.store.get(&request.account_id, id)? {
            if existing.status != SubmissionStatus::Failed {
                return Ok(existing);
            }
        }

        let envelope = SubmissionEnvelope::from_request(&request);
        self.store.put(&request.account_id, id, envelope.clone())?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let sequence = self.sequence.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let queue = self.queue_for(&request.signing_account).await;
        queue.heap.lock().await.push(Queued {
            priority: request.priority,
            sequence,
            request: request.clone(),
            reply: reply_tx,
        });
        queue.notify.notify_one();

        self.ensure_worker(request.signing_account.clone());

        if !request.wait_for_confirmation {
            return Ok(envelope);
        }

        let timeout = Duration::from_millis(request.timeout_ms.unwrap_or(30_000));
        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SubmitterError::Upstream("worker dropped reply channel".into())),
            Err(_) => Err(SubmitterError::Timeout),
        }
    }

    pub fn get(&self, account_id: &AccountId, id: Uuid) -> Result<SubmissionEnvelope, SubmitterError> {
        self.store.get(account_id, id)?.ok_or(SubmitterError::NotFound)
    }

    async fn queue_for(&self, signing_account: &str) -> Arc<AccountQueue> {
        if let Some(q) = self.queues.read().await.get(signing_account) {
            return q.clone();
        }
        let mut queues = self.queues.write().await;
        queues
            .entry(signing_account.to_string())
            .or_insert_with(|| {
                Arc::new(AccountQueue {
                    heap: Mutex::new(BinaryHeap::new()),
                    notify: Notify::new(),
                })
            })
            .clone()
    }

    /// Spawns a worker draining `signing_account`'s queue if one isn't
    /// already running. The worker owns execution order: strictly one
    /// in-flight broadcast per signing account at a time.
    fn ensure_worker(self: &Arc<Self>, signing_account: String) {
        let this = self.clone();
        tokio::spawn(async move {
            let queue = this.queue_for(&signing_account).await;
            loop {
                let next = queue.heap.lock().await.pop();
                let Some(queued) = next else {
                    // Yield the worker slot; a fresh submit will spawn a new
                    // one if the queue gains more work after this point.
                    return;
                };
                let outcome = this.execute(queued.request).await;
                let _ = queued.reply.send(outcome);
            }
        });
    }

    async fn execute(
        self: &Arc<Self>,
        request: SubmissionRequest,
    ) -> Result<SubmissionEnvelope, SubmitterError> {
        let id = envelope_id(&request.account_id, &request.request_id);
        let mut envelope = self
            .store
            .get(&request.account_id, id)?
            .ok_or(SubmitterError::NotFound)?;

        envelope.submit_attempts += 1;
        envelope.updated_at = chrono::Utc::now();
        self.store.put(&request.account_id, id, envelope.clone())?;

        match self.client.broadcast(&request.chain_id, &request.payload).await {
            Ok(tx_hash) => {
                envelope.tx_hash = Some(tx_hash);
                envelope.status = SubmissionStatus::Submitted;
                envelope.updated_at = chrono::Utc::now();
                self.store.put(&request.account_id, id, envelope.clone())?;
                self.metrics.submitted_total.inc();
            }
            Err(cause) => {
                envelope.status = SubmissionStatus::Failed;
                envelope.last_error = Some(cause.clone());
                envelope.updated_at = chrono::Utc::now();
                self.store.put(&request.account_id, id, envelope.clone())?;
                self.metrics.failed_total.inc();
                return Err(SubmitterError::Upstream(cause));
            }
        }

        if request.wait_for_confirmation {
            envelope = self.await_confirmation(request, envelope).await?;
        }

        Ok(envelope)
    }

    /// Polls `confirmation_depth` until it reaches the configured threshold.
    /// If the tx disappears (reorg), resubmits up to `max_resubmits` times
    /// before giving up.
    async fn await_confirmation(
        self: &Arc<Self>,
        request: SubmissionRequest,
        mut envelope: SubmissionEnvelope,
    ) -> Result<SubmissionEnvelope, SubmitterError> {
        let id = envelope_id(&request.account_id, &request.request_id);
        let deadline = Duration::from_millis(request.timeout_ms.unwrap_or(30_000));
        let poll_interval = Duration::from_millis(200);
        let start = tokio::time::Instant::now();

        loop {
            if start.elapsed() > deadline {
                return Err(SubmitterError::Timeout);
            }

            let tx_hash = envelope.tx_hash.clone().ok_or(SubmitterError::NotFound)?;
            match self.client.confirmation_depth(&request.chain_id, &tx_hash).await {
                Ok(Some(depth)) if depth >= self.confirmation_depth => {
                    envelope.status = SubmissionStatus::Confirmed;
                    envelope.confirmed_at = Some(chrono::Utc::now());
                    envelope.updated_at = chrono::Utc::now();
                    self.store.put(&request.account_id, id, envelope.clone())?;
                    self.metrics.confirmed_total.inc();
                    return Ok(envelope);
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    if envelope.resubmit_count >= self.max_resubmits {
                        envelope.status = SubmissionStatus::Failed;
                        envelope.last_error = Some("reorg: transaction no longer visible".into());
                        envelope.updated_at = chrono::Utc::now();
                        self.store.put(&request.account_id, id, envelope.clone())?;
                        self.metrics.failed_total.inc();
                        return Err(SubmitterError::Upstream(
                            "reorg resubmit limit exceeded".into(),
                        ));
                    }
                    envelope.resubmit_count += 1;
                    match self.client.broadcast(&request.chain_id, &request.payload).await {
                        Ok(tx_hash) => {
                            envelope.tx_hash = Some(tx_hash);
                            envelope.updated_at = chrono::Utc::now();
                            self.store.put(&request.account_id, id, envelope.clone())?;
                        }
                        Err(cause) => return Err(SubmitterError::Upstream(cause)),
                    }
                }
                Err(cause) => return Err(SubmitterError::Upstream(cause)),
            }

            tokio::time::sleep(poll_interval).await;
        }
    }
}
