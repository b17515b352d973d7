use thiserror::Error;
use viridian_types::BlobId;

use crate::tree::{MAX_BLOB_SIZE, MAX_TREE_DEPTH};

/// Errors from blob storage backends.
#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("column family not found: {0}")]
    ColumnFamilyNotFound(String),

    #[error("failed to join spawned task: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Errors surfaced while reading or writing an execution-data tree.
#[derive(Debug, Error)]
pub enum ExecutionDataError {
    /// A blob in the tree could not be found. Retryable: peers may still be
    /// seeding it.
    #[error("blob {0} not found")]
    BlobNotFound(BlobId),

    /// A locally stored blob no longer hashes to its id.
    #[error("blob {0} failed hash verification")]
    HashMismatch(BlobId),

    /// A blob decoded to something other than a well-formed tree node, or
    /// the reassembled payload did not decode to execution data.
    #[error("malformed execution data: {0}")]
    MalformedData(String),

    /// A blob exceeds the per-blob size ceiling.
    #[error("blob {id} is {size} bytes, exceeds the {limit} byte limit")]
    BlobSizeExceeded { id: BlobId, size: usize, limit: usize },

    /// Tree traversal exceeded the depth ceiling.
    #[error("blob tree exceeds the max depth of {limit}")]
    TreeDepthExceeded { limit: usize },

    #[error("blob storage error: {0}")]
    Store(#[from] BlobStoreError),
}

impl ExecutionDataError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedData(reason.into())
    }

    pub fn oversize(id: BlobId, size: usize) -> Self {
        Self::BlobSizeExceeded { id, size, limit: MAX_BLOB_SIZE }
    }

    pub fn too_deep() -> Self {
        Self::TreeDepthExceeded { limit: MAX_TREE_DEPTH }
    }

    /// True for errors that mean a sealed result committed to unusable data.
    /// These are never retried.
    pub fn is_invalid(&self) -> bool {
        matches!(
            self,
            Self::MalformedData(_) | Self::BlobSizeExceeded { .. } | Self::TreeDepthExceeded { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BlobNotFound(_))
    }
}
