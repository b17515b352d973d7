use serde::{Deserialize, Serialize};

use crate::{
    aliases::{BlockId, ExecutionDataId},
    height::Height,
};

/// A block whose execution result has been committed by consensus.
///
/// Carries the root id of the execution-data tree the result committed to.
/// Immutable once sealed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBlock {
    pub block_id: BlockId,
    pub height: Height,
    pub execution_data_id: ExecutionDataId,
}

impl SealedBlock {
    pub fn new(block_id: BlockId, height: Height, execution_data_id: ExecutionDataId) -> Self {
        Self { block_id, height, execution_data_id }
    }
}
