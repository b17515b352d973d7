use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use tracing::debug;
use viridian_types::BlobId;

use super::BlobStore;
use crate::error::BlobStoreError;

/// Column family holding content-addressed blobs.
const CF_BLOBS: &str = "blobs";

/// RocksDB-backed blob store.
///
/// Keys are the raw 32-byte content ids; values are the serialized blobs.
/// All operations run on the blocking pool since rocksdb I/O is synchronous.
#[derive(Clone)]
pub struct RocksDbBlobStore {
    db: Arc<DB>,
}

impl RocksDbBlobStore {
    /// Open (or create) a blob store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BlobStoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_blobs = ColumnFamilyDescriptor::new(CF_BLOBS, Options::default());
        let db = DB::open_cf_descriptors(&db_opts, path, vec![cf_blobs])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_blobs(db: &DB) -> Result<&rocksdb::ColumnFamily, BlobStoreError> {
        db.cf_handle(CF_BLOBS)
            .ok_or_else(|| BlobStoreError::ColumnFamilyNotFound(CF_BLOBS.to_string()))
    }
}

#[async_trait]
impl BlobStore for RocksDbBlobStore {
    async fn get(&self, id: BlobId) -> Result<Option<Bytes>, BlobStoreError> {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || {
            let cf = Self::cf_blobs(&db)?;
            Ok(db.get_cf(cf, id.as_slice())?.map(Bytes::from))
        })
        .await?
    }

    async fn put(&self, id: BlobId, bytes: Bytes) -> Result<(), BlobStoreError> {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || {
            let cf = Self::cf_blobs(&db)?;
            db.put_cf(cf, id.as_slice(), &bytes)?;

            debug!(blob_id = %id, size = bytes.len(), "Stored blob");
            Ok(())
        })
        .await?
    }

    async fn delete(&self, id: BlobId) -> Result<(), BlobStoreError> {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || {
            let cf = Self::cf_blobs(&db)?;
            db.delete_cf(cf, id.as_slice())?;

            debug!(blob_id = %id, "Deleted blob");
            Ok(())
        })
        .await?
    }

    async fn contains(&self, id: BlobId) -> Result<bool, BlobStoreError> {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || {
            let cf = Self::cf_blobs(&db)?;
            Ok(db.get_pinned_cf(cf, id.as_slice())?.is_some())
        })
        .await?
    }
}
