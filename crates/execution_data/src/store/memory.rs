use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;
use viridian_types::BlobId;

use super::BlobStore;
use crate::error::BlobStoreError;

/// In-memory blob store used by tests and lightweight tooling.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<BlobId, Bytes>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite the bytes stored under `id` without rehashing.
    ///
    /// Only exists so tests can simulate on-disk corruption.
    pub fn corrupt(&self, id: BlobId, bytes: Bytes) {
        self.blobs.lock().unwrap().insert(id, bytes);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, id: BlobId) -> Result<Option<Bytes>, BlobStoreError> {
        Ok(self.blobs.lock().unwrap().get(&id).cloned())
    }

    async fn put(&self, id: BlobId, bytes: Bytes) -> Result<(), BlobStoreError> {
        self.blobs.lock().unwrap().insert(id, bytes);
        Ok(())
    }

    async fn delete(&self, id: BlobId) -> Result<(), BlobStoreError> {
        self.blobs.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn contains(&self, id: BlobId) -> Result<bool, BlobStoreError> {
        Ok(self.blobs.lock().unwrap().contains_key(&id))
    }
}
