//! Blob-tree layout for execution data.
//!
//! The serialized execution data is split into leaf blobs of at most
//! [`CHUNK_SIZE`] payload bytes. Parent blobs hold ordered child-id lists
//! with fanout at most [`MAX_TREE_FANOUT`]; levels nest until a single root
//! blob remains. Every blob is addressed by the SHA-256 of its serialized
//! bytes, so the root id commits to the entire tree.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use viridian_types::{aliases::B256, BlobId};

use crate::error::ExecutionDataError;

/// Hard ceiling on the serialized size of a single blob. A blob larger than
/// this could never have been produced by a conforming writer.
pub const MAX_BLOB_SIZE: usize = 1 << 20;

/// Ceiling on tree nesting. With the fanout below, eight levels cover far
/// more data than any real block can produce.
pub const MAX_TREE_DEPTH: usize = 8;

/// Payload bytes per leaf blob.
pub const CHUNK_SIZE: usize = 256 * 1024;

/// Child ids per branch blob.
pub const MAX_TREE_FANOUT: usize = 1024;

/// Content id of a serialized blob.
pub fn blob_id(bytes: &[u8]) -> BlobId {
    B256::from_slice(&Sha256::digest(bytes))
}

/// A single node of the blob tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeNode {
    /// A slice of the serialized execution data.
    Leaf(Bytes),
    /// Ordered ids of the children one level down.
    Branch(Vec<BlobId>),
}

impl TreeNode {
    pub fn encode(&self) -> Result<Bytes, ExecutionDataError> {
        let encoded = bincode::serialize(self)
            .map_err(|e| ExecutionDataError::malformed(format!("encode tree node: {e}")))?;
        Ok(Bytes::from(encoded))
    }

    pub fn decode(id: BlobId, bytes: &[u8]) -> Result<Self, ExecutionDataError> {
        if bytes.len() > MAX_BLOB_SIZE {
            return Err(ExecutionDataError::oversize(id, bytes.len()));
        }
        bincode::deserialize(bytes)
            .map_err(|e| ExecutionDataError::malformed(format!("decode blob {id}: {e}")))
    }
}
