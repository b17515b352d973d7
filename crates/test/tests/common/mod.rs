//! Shared harness for requester integration tests.
#![allow(dead_code)]

pub mod mocks;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use mocks::{MockBlobNetwork, MockSealedSource};
use viridian_execution_data::{
    BlobStore, ExecutionData, ExecutionDataService, LocalBlobService, MemoryBlobStore,
};
use viridian_requester::{
    ExecutionDataRequester, MemoryProgressStore, ProgressStore, RequesterHandle, RequesterMetrics,
};
use viridian_types::{aliases::B256, BlockId, Height, RequesterConfig, SealedBlock};

/// Everything a test needs to drive one requester instance. The stores and
/// mocks outlive the handle, so "restart" is just calling `spawn` again.
pub struct Harness {
    pub config: RequesterConfig,
    pub local: MemoryBlobStore,
    pub network: Arc<MockBlobNetwork>,
    pub progress: Arc<dyn ProgressStore>,
    pub source: Arc<MockSealedSource>,
    pub metrics: RequesterMetrics,
    received: Arc<Mutex<Vec<Height>>>,
}

impl Harness {
    pub fn new(config: RequesterConfig) -> Self {
        Self::with_progress(config, Arc::new(MemoryProgressStore::new()))
    }

    pub fn with_progress(config: RequesterConfig, progress: Arc<dyn ProgressStore>) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();

        let local = MemoryBlobStore::new();
        let network = Arc::new(MockBlobNetwork::new(Arc::new(local.clone())));

        Self {
            config,
            local,
            network,
            progress,
            source: Arc::new(MockSealedSource::new()),
            metrics: RequesterMetrics::new(),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Spawn a requester over the harness state and attach the height
    /// collector subscriber.
    pub fn spawn(&self) -> RequesterHandle {
        let requester = ExecutionDataRequester::new(
            self.config.clone(),
            Arc::clone(&self.network),
            Arc::new(self.local.clone()),
            Arc::clone(&self.progress),
            Arc::clone(&self.source),
            self.metrics.clone(),
        );

        // registered before spawning so no notification can slip past
        let received = Arc::clone(&self.received);
        requester.add_subscriber(move |height, _data| received.lock().unwrap().push(height));

        requester.spawn()
    }

    /// Heights delivered to subscribers so far, in delivery order.
    pub fn received(&self) -> Vec<Height> {
        self.received.lock().unwrap().clone()
    }

    /// Publish execution data for `height` to the remote peers and seal the
    /// block. Returns the sealed block (carrying the tree's root id).
    pub async fn seal_with_remote_data(&self, height: u64) -> SealedBlock {
        let data = sample_execution_data(height);
        let remote = ExecutionDataService::new(LocalBlobService::new(self.network.remote().clone()));
        let root = remote.add(&data).await.expect("seeding remote data");
        self.seal(height, root)
    }

    /// Publish execution data for `height` straight into the local store
    /// (as a previous run of the requester would have) and seal the block.
    pub async fn seal_with_local_data(&self, height: u64) -> SealedBlock {
        let root = self.seed_local(height).await;
        self.seal(height, root)
    }

    /// Write `height`'s execution data into the local store without sealing,
    /// mirroring what a completed fetch leaves behind.
    pub async fn seed_local(&self, height: u64) -> B256 {
        let data = sample_execution_data(height);
        let local = ExecutionDataService::new(LocalBlobService::new(self.local.clone()));
        local.add(&data).await.expect("seeding local data")
    }

    fn seal(&self, height: u64, root: B256) -> SealedBlock {
        let sealed = SealedBlock::new(test_block_id(height), Height::new(height), root);
        self.source.seal(sealed);
        sealed
    }

    /// Local blob store as the requester sees it.
    pub fn local_store(&self) -> Arc<dyn BlobStore> {
        Arc::new(self.local.clone())
    }
}

pub fn test_block_id(height: u64) -> BlockId {
    let mut bytes = [0xb1u8; 32];
    bytes[24..].copy_from_slice(&height.to_be_bytes());
    B256::from(bytes)
}

pub fn sample_execution_data(height: u64) -> ExecutionData {
    let chunks = vec![
        Bytes::from(height.to_be_bytes().to_vec()),
        Bytes::from(vec![height as u8; 64]),
    ];
    ExecutionData::new(test_block_id(height), chunks)
}

pub fn heights(range: impl IntoIterator<Item = u64>) -> Vec<Height> {
    range.into_iter().map(Height::new).collect()
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return condition();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait for the component's ready signal.
pub async fn wait_ready(handle: &RequesterHandle, timeout: Duration) -> bool {
    let mut ready = handle.ready();
    tokio::time::timeout(timeout, async move {
        loop {
            if *ready.borrow_and_update() {
                return true;
            }
            if ready.changed().await.is_err() {
                return false;
            }
        }
    })
    .await
    .unwrap_or(false)
}
