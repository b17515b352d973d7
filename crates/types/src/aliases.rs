pub type B256 = alloy_primitives::B256;

/// Hash of a sealed block header.
pub type BlockId = B256;

/// Content id of a single blob (hash of its serialized bytes).
pub type BlobId = B256;

/// Content id of the root blob of an execution-data tree.
///
/// Equal to the `execution_data_id` committed on the sealed execution result.
pub type ExecutionDataId = B256;
