//! The execution data requester.
//!
//! Downloads execution data for sealed blocks from the blob network and
//! notifies local subscribers in strict height order. Three kinds of worker
//! run under one cancellation scope:
//!
//! * **bootstrap**: loads persisted progress, refuses to start when halted,
//!   optionally runs the local datastore check, then signals ready.
//! * **fetch pool**: claims sealed heights in ascending order, downloads
//!   each tree with unbounded retry, and commits the dense processed
//!   checkpoint as contiguous heights finish.
//! * **notify worker**: delivers fetched heights to subscribers one at a
//!   time, in order, rereading evicted entries from the local store.
//!
//! ```text
//!                        ┌──────────────┐
//!                     ┌──│ fetch worker │──┐
//!  on_block_finalized │  ├──────────────┤  │   ┌───────────────┐
//! ────────────────────┼──│ fetch worker │──┼──▶│ notify worker │──▶ subscribers
//!     (wake tick)     │  ├──────────────┤  │   └───────────────┘
//!                     └──│ fetch worker │──┘      strict height
//!                        └──────────────┘             order
//! ```

use std::sync::Arc;

use tokio::{
    sync::{watch, Notify},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use viridian_execution_data::{
    BlobService, BlobStore, ExecutionData, ExecutionDataService, LocalBlobService,
};
use viridian_types::{Height, RequesterConfig};

use crate::{
    cache::{BlockEntry, StatusCache},
    consistency::ConsistencyChecker,
    error::RequesterError,
    fetcher::{FetchFailure, Fetcher},
    metrics::RequesterMetrics,
    progress::ProgressStore,
    sequencer::HeightSequencer,
    source::SealedBlockSource,
    subscribers::SubscriberSet,
};

type LocalService = ExecutionDataService<LocalBlobService<Arc<dyn BlobStore>>>;

/// Builder for the requester component. [`spawn`](Self::spawn) starts the
/// workers and hands back the host-facing [`RequesterHandle`].
pub struct ExecutionDataRequester {
    inner: Arc<Inner>,
}

struct Inner {
    config: RequesterConfig,
    source: Arc<dyn SealedBlockSource>,
    local_store: Arc<dyn BlobStore>,
    /// Local-only view of the blob store, used to reread evicted entries at
    /// notification time.
    local: LocalService,
    progress: Arc<dyn ProgressStore>,
    cache: Arc<StatusCache>,
    sequencer: HeightSequencer,
    fetcher: Fetcher,
    subscribers: SubscriberSet,
    metrics: RequesterMetrics,
    /// Wake tick for the fetch pool: finalization pings and notify-side
    /// drains both bump it.
    fetch_tick: watch::Sender<u64>,
    notify_wake: Arc<Notify>,
    ready: watch::Sender<bool>,
    token: CancellationToken,
}

impl ExecutionDataRequester {
    /// Wire up a requester.
    ///
    /// `network` is the p2p blob fabric; its `add` must write through to
    /// `local_store`, which the notify worker and the startup check read
    /// directly.
    pub fn new(
        config: RequesterConfig,
        network: Arc<dyn BlobService>,
        local_store: Arc<dyn BlobStore>,
        progress: Arc<dyn ProgressStore>,
        source: Arc<dyn SealedBlockSource>,
        metrics: RequesterMetrics,
    ) -> Self {
        let notify_wake = Arc::new(Notify::new());
        let sequencer = HeightSequencer::new(config.start_height, Arc::clone(&progress));
        let cache = Arc::new(StatusCache::new(
            config.start_height,
            config.max_cached_entries,
            config.max_search_ahead,
            Arc::clone(&progress),
            sequencer.cursor(),
            Arc::clone(&notify_wake),
        ));
        let fetcher = Fetcher::new(
            ExecutionDataService::new(network),
            config.fetch_timeout(),
            config.retry_delay(),
            config.max_retry_delay(),
            metrics.clone(),
        );
        let local = ExecutionDataService::new(LocalBlobService::new(Arc::clone(&local_store)));

        let (fetch_tick, _) = watch::channel(0);
        let (ready, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                config,
                source,
                local_store,
                local,
                progress,
                cache,
                sequencer,
                fetcher,
                subscribers: SubscriberSet::default(),
                metrics,
                fetch_tick,
                notify_wake,
                ready,
                token: CancellationToken::new(),
            }),
        }
    }

    /// Register a callback before the workers start, guaranteeing it sees
    /// every notified height. See [`RequesterHandle::add_subscriber`].
    pub fn add_subscriber(
        &self,
        callback: impl Fn(Height, Arc<ExecutionData>) + Send + Sync + 'static,
    ) {
        self.inner.subscribers.add(callback);
    }

    /// Start the bootstrap, fetch, and notify workers.
    pub fn spawn(self) -> RequesterHandle {
        let inner = self.inner;

        let mut workers: JoinSet<Result<(), RequesterError>> = JoinSet::new();

        {
            let inner = Arc::clone(&inner);
            workers.spawn(async move { inner.bootstrap().await });
        }
        for worker in 0..inner.config.fetch_workers.max(1) {
            let inner = Arc::clone(&inner);
            workers.spawn(async move { inner.fetch_worker(worker).await });
        }
        {
            let inner = Arc::clone(&inner);
            workers.spawn(async move { inner.notify_worker().await });
        }

        let supervisor = {
            let inner = Arc::clone(&inner);
            tokio::spawn(async move {
                let mut result: Result<(), RequesterError> = Ok(());
                while let Some(joined) = workers.join_next().await {
                    let worker_result = match joined {
                        Ok(worker_result) => worker_result,
                        Err(join_err) => Err(RequesterError::Worker(join_err.to_string())),
                    };
                    if let Err(err) = worker_result {
                        error!(error = %err, "requester worker failed, stopping component");
                        if result.is_ok() {
                            result = Err(err);
                        }
                        inner.token.cancel();
                    }
                }
                result
            })
        };

        RequesterHandle { inner, supervisor }
    }
}

/// Host-facing handle to a running requester.
pub struct RequesterHandle {
    inner: Arc<Inner>,
    supervisor: tokio::task::JoinHandle<Result<(), RequesterError>>,
}

impl RequesterHandle {
    /// Signal that a new block was finalized. Payload-free: the fetch pool
    /// rescans the sealed chain itself, so delivering the ping N times is
    /// the same as delivering it once.
    pub fn on_block_finalized(&self) {
        self.inner.fetch_tick.send_modify(|tick| *tick = tick.wrapping_add(1));
    }

    /// Register a callback for fetched execution data.
    ///
    /// Callbacks must be concurrency safe, non-blocking, and idempotent.
    /// There is no deregistration; registering twice means two invocations
    /// per height.
    pub fn add_subscriber(
        &self,
        callback: impl Fn(Height, Arc<ExecutionData>) + Send + Sync + 'static,
    ) {
        self.inner.subscribers.add(callback);
    }

    /// Readiness signal. Stays false forever when the requester came up
    /// halted.
    pub fn ready(&self) -> watch::Receiver<bool> {
        self.inner.ready.subscribe()
    }

    /// Wait for the component to stop. Resolves only on a fatal error or
    /// after cancellation.
    pub async fn join(self) -> Result<(), RequesterError> {
        self.supervisor.await.unwrap_or_else(|err| Err(RequesterError::Worker(err.to_string())))
    }

    /// Cancel all workers and wait for them to drain. No subscriber
    /// callback runs after this returns.
    pub async fn shutdown(self) -> Result<(), RequesterError> {
        self.inner.token.cancel();
        self.join().await
    }
}

impl Inner {
    /// One-shot startup worker.
    async fn bootstrap(self: Arc<Self>) -> Result<(), RequesterError> {
        let progress = self.progress.read().await?;
        self.cache.load(progress);
        self.sequencer.resume(progress.processed);

        if progress.halted {
            self.metrics.record_halted();
            error!(
                "HALTED: requester was halted on a previous run due to invalid execution data; \
                 wipe its state to recover"
            );
            // never signals ready: the other workers stay parked
            return Ok(());
        }

        debug!(
            start_height = %self.config.start_height,
            processed = ?progress.processed,
            notified = ?progress.notified,
            "starting execution data requester"
        );

        if self.config.check_enabled {
            let checker = ConsistencyChecker {
                start_height: self.config.start_height,
                source: Arc::clone(&self.source),
                local: ExecutionDataService::new(
                    LocalBlobService::new(Arc::clone(&self.local_store)).with_hash_on_read(true),
                ),
                fetcher: self.fetcher.clone(),
                cache: Arc::clone(&self.cache),
                metrics: self.metrics.clone(),
                token: self.token.clone(),
            };
            checker.run(progress.notified).await?;
        }

        let _ = self.ready.send(true);
        info!("execution data requester ready");
        Ok(())
    }

    /// Member of the fetch pool.
    async fn fetch_worker(self: Arc<Self>, worker: usize) -> Result<(), RequesterError> {
        if !self.wait_ready().await {
            return Ok(());
        }
        debug!(worker, "fetch worker started");

        let mut tick = self.fetch_tick.subscribe();
        loop {
            if self.token.is_cancelled() || self.cache.halted() {
                return Ok(());
            }

            let highest_sealed = self.source.highest_sealed().await;
            let paused = self.cache.should_pause_fetch();
            let limit = self.cache.dispatch_limit();
            match self.sequencer.try_claim(highest_sealed, paused, limit) {
                Some(height) => self.process_height(height).await?,
                None => tokio::select! {
                    _ = self.token.cancelled() => return Ok(()),
                    changed = tick.changed() => {
                        if changed.is_err() {
                            return Ok(());
                        }
                    }
                },
            }
        }
    }

    /// Download one sealed height, retrying until it succeeds or the
    /// component stops.
    async fn process_height(&self, height: Height) -> Result<(), RequesterError> {
        let sealed = self
            .source
            .block_at(height)
            .await
            .map_err(|source| RequesterError::SealedLookup { height, source })?;

        debug!(height = %height, block_id = %sealed.block_id, "processing fetch request");

        match self.fetcher.fetch_with_retry(sealed.execution_data_id, height, &self.token).await {
            Ok(data) => {
                self.cache.fetched(BlockEntry {
                    block_id: sealed.block_id,
                    height,
                    execution_data_id: sealed.execution_data_id,
                    execution_data: Some(Arc::new(data)),
                });
                self.sequencer.complete(height).await?;
                self.notify_wake.notify_one();
                Ok(())
            }
            Err(FetchFailure::Cancelled) => Ok(()),
            Err(FetchFailure::Invalid(err)) => {
                // a sealed result committed to unusable data: refuse to make
                // further progress until an operator intervenes
                error!(
                    height = %height,
                    execution_data_id = %sealed.execution_data_id,
                    error = %err,
                    "HALTING: invalid execution data found"
                );
                self.cache.halt().await?;
                self.metrics.record_halted();
                Err(RequesterError::Halted)
            }
            Err(FetchFailure::LocalWrite(source)) => {
                Err(RequesterError::LocalData { height, source })
            }
        }
    }

    /// Single worker delivering notifications in height order.
    async fn notify_worker(self: Arc<Self>) -> Result<(), RequesterError> {
        if !self.wait_ready().await {
            return Ok(());
        }
        debug!("notify worker started");

        loop {
            if self.token.is_cancelled() {
                return Ok(());
            }

            let wake = self.notify_wake.notified();
            match self.cache.next_to_notify() {
                Some(height) => self.notify_height(height).await?,
                None => tokio::select! {
                    _ = self.token.cancelled() => return Ok(()),
                    _ = wake => {}
                },
            }
        }
    }

    async fn notify_height(&self, height: Height) -> Result<(), RequesterError> {
        let data = match self.cache.get_entry(height).and_then(|entry| entry.execution_data) {
            Some(data) => data,
            None => {
                // evicted from the cache; the fetch already persisted it
                debug!(height = %height, "execution data not in cache, reading local store");
                let sealed = self
                    .source
                    .block_at(height)
                    .await
                    .map_err(|source| RequesterError::SealedLookup { height, source })?;
                let data = self
                    .local
                    .get(sealed.execution_data_id)
                    .await
                    .map_err(|source| RequesterError::LocalData { height, source })?;
                Arc::new(data)
            }
        };

        self.subscribers.notify(height, &data);
        self.metrics.record_notification_sent(height);
        self.cache.mark_notified(height).await?;

        // the notify side drained a height; unpause the fetch pool
        self.fetch_tick.send_modify(|tick| *tick = tick.wrapping_add(1));
        Ok(())
    }

    /// Park until the bootstrap signals ready. False means the component
    /// was cancelled first.
    async fn wait_ready(&self) -> bool {
        let mut ready = self.ready.subscribe();
        loop {
            if *ready.borrow_and_update() {
                return true;
            }
            tokio::select! {
                _ = self.token.cancelled() => return false,
                changed = ready.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }
}
