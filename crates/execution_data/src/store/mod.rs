use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use viridian_types::BlobId;

use crate::error::BlobStoreError;

pub mod memory;
pub mod rocksdb;

pub use memory::MemoryBlobStore;
pub use rocksdb::RocksDbBlobStore;

/// Local content-addressed blob storage.
///
/// Keys are blob content ids; the store itself never verifies that a value
/// hashes to its key (that is the blob service's job, when configured with
/// hash-on-read). All methods are async so backends can use spawn_blocking
/// or native async I/O.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch a blob, or `None` if it is not stored locally.
    async fn get(&self, id: BlobId) -> Result<Option<Bytes>, BlobStoreError>;

    /// Store a blob under its content id. Overwriting is a no-op.
    async fn put(&self, id: BlobId, bytes: Bytes) -> Result<(), BlobStoreError>;

    /// Remove a blob. Removing an absent blob is not an error.
    async fn delete(&self, id: BlobId) -> Result<(), BlobStoreError>;

    async fn contains(&self, id: BlobId) -> Result<bool, BlobStoreError>;
}

#[async_trait]
impl<S: BlobStore + ?Sized> BlobStore for Arc<S> {
    async fn get(&self, id: BlobId) -> Result<Option<Bytes>, BlobStoreError> {
        (**self).get(id).await
    }

    async fn put(&self, id: BlobId, bytes: Bytes) -> Result<(), BlobStoreError> {
        (**self).put(id, bytes).await
    }

    async fn delete(&self, id: BlobId) -> Result<(), BlobStoreError> {
        (**self).delete(id).await
    }

    async fn contains(&self, id: BlobId) -> Result<bool, BlobStoreError> {
        (**self).contains(id).await
    }
}
