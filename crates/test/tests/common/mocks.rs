//! Test doubles for the requester's external collaborators.
//!
//! The blob network mock serves content from an in-memory "remote" store
//! (what peers seed) and writes fetched trees through to the requester's
//! local store, like the production fabric does. Per-blob scripts inject
//! failures and holds so tests can control completion order.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;
use viridian_execution_data::{
    blob_id, BlobService, BlobStore, ExecutionDataError, MemoryBlobStore,
};
use viridian_requester::{Progress, ProgressStore, ProgressStoreError, SealedBlockSource, SourceError};
use viridian_types::{BlobId, Height, SealedBlock};

/// Scripted p2p blob fabric.
pub struct MockBlobNetwork {
    /// Content seeded by remote peers.
    remote: MemoryBlobStore,
    /// The requester's local store; `add` writes through to it.
    local: Arc<dyn BlobStore>,
    scripts: Mutex<HashMap<BlobId, Script>>,
    gets: Mutex<Vec<BlobId>>,
}

#[derive(Default)]
struct Script {
    /// Remaining number of `get` calls to fail with not-found.
    fail_remaining: usize,
    /// While present and false, `get` parks until released.
    hold: Option<watch::Receiver<bool>>,
}

/// Releases a held blob. Dropping without `release` keeps it held.
pub struct Hold {
    tx: watch::Sender<bool>,
}

impl Hold {
    pub fn release(&self) {
        let _ = self.tx.send(true);
    }
}

impl MockBlobNetwork {
    pub fn new(local: Arc<dyn BlobStore>) -> Self {
        Self {
            remote: MemoryBlobStore::new(),
            local,
            scripts: Mutex::new(HashMap::new()),
            gets: Mutex::new(Vec::new()),
        }
    }

    pub fn remote(&self) -> &MemoryBlobStore {
        &self.remote
    }

    /// Make the next `count` gets of `id` fail with blob-not-found.
    pub fn fail_times(&self, id: BlobId, count: usize) {
        self.scripts.lock().unwrap().entry(id).or_default().fail_remaining = count;
    }

    /// Park every `get` of `id` until the returned [`Hold`] is released.
    pub fn hold(&self, id: BlobId) -> Hold {
        let (tx, rx) = watch::channel(false);
        self.scripts.lock().unwrap().entry(id).or_default().hold = Some(rx);
        Hold { tx }
    }

    /// Every blob id requested over the network so far, in call order.
    pub fn recorded_gets(&self) -> Vec<BlobId> {
        self.gets.lock().unwrap().clone()
    }

    pub fn gets_for(&self, id: BlobId) -> usize {
        self.gets.lock().unwrap().iter().filter(|seen| **seen == id).count()
    }
}

#[async_trait]
impl BlobService for MockBlobNetwork {
    async fn get(&self, id: BlobId) -> Result<Bytes, ExecutionDataError> {
        self.gets.lock().unwrap().push(id);

        let (hold, should_fail) = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&id) {
                Some(script) => {
                    let should_fail = script.fail_remaining > 0;
                    if should_fail {
                        script.fail_remaining -= 1;
                    }
                    (script.hold.clone(), should_fail)
                }
                None => (None, false),
            }
        };

        if let Some(mut released) = hold {
            while !*released.borrow_and_update() {
                if released.changed().await.is_err() {
                    break;
                }
            }
        }

        if should_fail {
            return Err(ExecutionDataError::BlobNotFound(id));
        }

        // like the real fabric: local content first, then remote peers
        if let Some(bytes) = self.local.get(id).await? {
            return Ok(bytes);
        }
        self.remote.get(id).await?.ok_or(ExecutionDataError::BlobNotFound(id))
    }

    async fn add(&self, bytes: Bytes) -> Result<BlobId, ExecutionDataError> {
        let id = blob_id(&bytes);
        self.local.put(id, bytes).await?;
        Ok(id)
    }

    async fn delete(&self, id: BlobId) -> Result<(), ExecutionDataError> {
        self.local.delete(id).await?;
        Ok(())
    }
}

/// In-memory sealed chain.
#[derive(Default)]
pub struct MockSealedSource {
    blocks: Mutex<BTreeMap<Height, SealedBlock>>,
}

impl MockSealedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seal(&self, block: SealedBlock) {
        self.blocks.lock().unwrap().insert(block.height, block);
    }
}

#[async_trait]
impl SealedBlockSource for MockSealedSource {
    async fn block_at(&self, height: Height) -> Result<SealedBlock, SourceError> {
        self.blocks.lock().unwrap().get(&height).copied().ok_or(SourceError::NotFound(height))
    }

    async fn highest_sealed(&self) -> Option<Height> {
        self.blocks.lock().unwrap().last_key_value().map(|(height, _)| *height)
    }
}

/// Progress store wrapper that fails the first `set_notified`, stopping the
/// component at exactly the crash point between subscriber fan-out and
/// checkpoint persistence.
pub struct CrashOnNotify<P> {
    inner: P,
    armed: Mutex<bool>,
}

impl<P> CrashOnNotify<P> {
    pub fn new(inner: P) -> Self {
        Self { inner, armed: Mutex::new(true) }
    }
}

#[async_trait]
impl<P: ProgressStore> ProgressStore for CrashOnNotify<P> {
    async fn read(&self) -> Result<Progress, ProgressStoreError> {
        self.inner.read().await
    }

    async fn set_processed(&self, height: Height) -> Result<(), ProgressStoreError> {
        self.inner.set_processed(height).await
    }

    async fn set_notified(&self, height: Height) -> Result<(), ProgressStoreError> {
        let fire = {
            let mut armed = self.armed.lock().unwrap();
            std::mem::replace(&mut *armed, false)
        };
        if fire {
            return Err(ProgressStoreError::Backend(
                "simulated crash before checkpoint write".into(),
            ));
        }
        self.inner.set_notified(height).await
    }

    async fn set_halted(&self) -> Result<(), ProgressStoreError> {
        self.inner.set_halted().await
    }
}
