use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use viridian_types::{BlobId, ExecutionDataId};

use crate::{
    error::ExecutionDataError,
    model::ExecutionData,
    store::BlobStore,
    tree::{blob_id, TreeNode, CHUNK_SIZE, MAX_TREE_DEPTH, MAX_TREE_FANOUT},
};

/// Content-addressed blob access.
///
/// In production this is backed by the p2p blob fabric: `get` may pull from
/// remote peers, `add` persists locally and announces to the network. Tests
/// substitute scripted implementations.
#[async_trait]
pub trait BlobService: Send + Sync {
    async fn get(&self, id: BlobId) -> Result<Bytes, ExecutionDataError>;

    /// Store a blob and return its content id.
    async fn add(&self, bytes: Bytes) -> Result<BlobId, ExecutionDataError>;

    async fn delete(&self, id: BlobId) -> Result<(), ExecutionDataError>;
}

#[async_trait]
impl<B: BlobService + ?Sized> BlobService for Arc<B> {
    async fn get(&self, id: BlobId) -> Result<Bytes, ExecutionDataError> {
        (**self).get(id).await
    }

    async fn add(&self, bytes: Bytes) -> Result<BlobId, ExecutionDataError> {
        (**self).add(bytes).await
    }

    async fn delete(&self, id: BlobId) -> Result<(), ExecutionDataError> {
        (**self).delete(id).await
    }
}

/// Blob service over the local store only. Never touches the network.
///
/// With hash-on-read enabled every blob is rehashed as it is served, so
/// on-disk corruption surfaces as [`ExecutionDataError::HashMismatch`]
/// instead of propagating bad bytes.
#[derive(Clone)]
pub struct LocalBlobService<S> {
    store: S,
    hash_on_read: bool,
}

impl<S: BlobStore> LocalBlobService<S> {
    pub fn new(store: S) -> Self {
        Self { store, hash_on_read: false }
    }

    pub fn with_hash_on_read(mut self, hash_on_read: bool) -> Self {
        self.hash_on_read = hash_on_read;
        self
    }
}

#[async_trait]
impl<S: BlobStore> BlobService for LocalBlobService<S> {
    async fn get(&self, id: BlobId) -> Result<Bytes, ExecutionDataError> {
        let bytes = self.store.get(id).await?.ok_or(ExecutionDataError::BlobNotFound(id))?;

        if self.hash_on_read && blob_id(&bytes) != id {
            return Err(ExecutionDataError::HashMismatch(id));
        }

        Ok(bytes)
    }

    async fn add(&self, bytes: Bytes) -> Result<BlobId, ExecutionDataError> {
        let id = blob_id(&bytes);
        self.store.put(id, bytes).await?;
        Ok(id)
    }

    async fn delete(&self, id: BlobId) -> Result<(), ExecutionDataError> {
        self.store.delete(id).await?;
        Ok(())
    }
}

/// Per-blob outcome recorded by [`ExecutionDataService::check`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlobIssueKind {
    NotFound,
    HashMismatch,
    Malformed,
    OversizeBlob,
    TreeTooDeep,
}

impl BlobIssueKind {
    /// True for issues that mean the sealed result committed to unusable
    /// data; these must never be repaired automatically.
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Malformed | Self::OversizeBlob | Self::TreeTooDeep)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobIssue {
    pub id: BlobId,
    pub kind: BlobIssueKind,
}

/// Result of walking a tree in the local store.
#[derive(Clone, Debug, Default)]
pub struct CheckReport {
    pub issues: Vec<BlobIssue>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    /// The first issue indicating committed-invalid data, if any.
    pub fn invalid(&self) -> Option<&BlobIssue> {
        self.issues.iter().find(|issue| issue.kind.is_invalid())
    }

    /// Blobs that went missing or corrupted locally and can be repaired by
    /// refetching the tree.
    pub fn repairable(&self) -> impl Iterator<Item = &BlobIssue> {
        self.issues.iter().filter(|issue| !issue.kind.is_invalid())
    }
}

/// Codec and tree traversal over a blob service.
///
/// `add` turns an [`ExecutionData`] value into a stored blob tree and
/// returns the root id; `get` is the inverse; `check` walks a tree in the
/// local store without failing fast, reporting every broken blob.
#[derive(Clone)]
pub struct ExecutionDataService<B> {
    blobs: B,
}

impl<B: BlobService> ExecutionDataService<B> {
    pub fn new(blobs: B) -> Self {
        Self { blobs }
    }

    pub fn blob_service(&self) -> &B {
        &self.blobs
    }

    /// Store `data` as a blob tree, returning the root id.
    pub async fn add(&self, data: &ExecutionData) -> Result<ExecutionDataId, ExecutionDataError> {
        let encoded = data.encode()?;

        let mut ids = Vec::new();
        let mut offset = 0;
        loop {
            let end = usize::min(offset + CHUNK_SIZE, encoded.len());
            ids.push(self.put_node(&TreeNode::Leaf(encoded.slice(offset..end))).await?);
            offset = end;
            if offset >= encoded.len() {
                break;
            }
        }

        let mut depth = 1;
        while ids.len() > 1 {
            depth += 1;
            if depth > MAX_TREE_DEPTH {
                return Err(ExecutionDataError::too_deep());
            }

            let mut parents = Vec::with_capacity(ids.len().div_ceil(MAX_TREE_FANOUT));
            for group in ids.chunks(MAX_TREE_FANOUT) {
                parents.push(self.put_node(&TreeNode::Branch(group.to_vec())).await?);
            }
            ids = parents;
        }

        let root = ids[0];
        debug!(root_id = %root, size = encoded.len(), "Stored execution data tree");
        Ok(root)
    }

    /// Fetch and reassemble the tree rooted at `root`.
    pub async fn get(&self, root: ExecutionDataId) -> Result<ExecutionData, ExecutionDataError> {
        let mut level = vec![root];

        for _ in 0..MAX_TREE_DEPTH {
            let mut leaves: Vec<Bytes> = Vec::new();
            let mut children: Vec<BlobId> = Vec::new();

            for id in &level {
                let bytes = self.blobs.get(*id).await?;
                match TreeNode::decode(*id, &bytes)? {
                    TreeNode::Leaf(payload) => leaves.push(payload),
                    TreeNode::Branch(ids) => {
                        if ids.is_empty() || ids.len() > MAX_TREE_FANOUT {
                            return Err(ExecutionDataError::malformed(format!(
                                "branch blob {id} has {} children",
                                ids.len()
                            )));
                        }
                        children.extend(ids);
                    }
                }
            }

            match (leaves.is_empty(), children.is_empty()) {
                // a full level of leaves terminates the walk
                (false, true) => {
                    let mut payload = Vec::new();
                    for leaf in &leaves {
                        payload.extend_from_slice(leaf);
                    }
                    return ExecutionData::decode(&payload);
                }
                (true, false) => level = children,
                _ => {
                    return Err(ExecutionDataError::malformed(
                        "tree level mixes leaf and branch blobs",
                    ))
                }
            }
        }

        Err(ExecutionDataError::too_deep())
    }

    /// Walk the tree rooted at `root` and report every broken blob instead
    /// of failing on the first one. Backend storage failures still abort.
    ///
    /// Meant to run against a hash-on-read [`LocalBlobService`]; a network
    /// backed service would mask local corruption by refetching.
    pub async fn check(&self, root: ExecutionDataId) -> Result<CheckReport, ExecutionDataError> {
        let mut issues = Vec::new();
        let mut level = vec![root];

        for depth in 0.. {
            let mut children: Vec<BlobId> = Vec::new();

            for id in &level {
                match self.blobs.get(*id).await {
                    Ok(bytes) => match TreeNode::decode(*id, &bytes) {
                        Ok(TreeNode::Leaf(_)) => {}
                        Ok(TreeNode::Branch(ids)) => children.extend(ids),
                        Err(err) => issues.push(BlobIssue { id: *id, kind: issue_kind(&err) }),
                    },
                    Err(ExecutionDataError::BlobNotFound(_)) => {
                        issues.push(BlobIssue { id: *id, kind: BlobIssueKind::NotFound });
                    }
                    Err(ExecutionDataError::HashMismatch(_)) => {
                        issues.push(BlobIssue { id: *id, kind: BlobIssueKind::HashMismatch });
                    }
                    Err(err) => return Err(err),
                }
            }

            if children.is_empty() {
                break;
            }
            if depth + 1 >= MAX_TREE_DEPTH {
                issues.push(BlobIssue { id: children[0], kind: BlobIssueKind::TreeTooDeep });
                break;
            }
            level = children;
        }

        Ok(CheckReport { issues })
    }

    async fn put_node(&self, node: &TreeNode) -> Result<BlobId, ExecutionDataError> {
        let bytes = node.encode()?;
        self.blobs.add(bytes).await
    }
}

fn issue_kind(err: &ExecutionDataError) -> BlobIssueKind {
    match err {
        ExecutionDataError::BlobSizeExceeded { .. } => BlobIssueKind::OversizeBlob,
        ExecutionDataError::TreeDepthExceeded { .. } => BlobIssueKind::TreeTooDeep,
        _ => BlobIssueKind::Malformed,
    }
}
