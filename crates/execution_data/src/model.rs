use bytes::Bytes;
use serde::{Deserialize, Serialize};
use viridian_types::BlockId;

use crate::error::ExecutionDataError;

/// The execution trace of a single block.
///
/// The chunk payloads are opaque to this subsystem: integrity is enforced at
/// the blob layer by content addressing, not by interpreting the trace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionData {
    pub block_id: BlockId,
    pub chunks: Vec<Bytes>,
}

impl ExecutionData {
    pub fn new(block_id: BlockId, chunks: Vec<Bytes>) -> Self {
        Self { block_id, chunks }
    }

    pub(crate) fn encode(&self) -> Result<Bytes, ExecutionDataError> {
        let encoded = bincode::serialize(self)
            .map_err(|e| ExecutionDataError::malformed(format!("encode: {e}")))?;
        Ok(Bytes::from(encoded))
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, ExecutionDataError> {
        bincode::deserialize(bytes)
            .map_err(|e| ExecutionDataError::malformed(format!("decode: {e}")))
    }
}
