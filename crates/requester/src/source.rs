use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use viridian_types::{Height, SealedBlock};

#[derive(Debug, Error)]
pub enum SourceError {
    /// The height has not been sealed (or does not exist yet).
    #[error("no sealed block at height {0}")]
    NotFound(Height),

    /// The sealed block exists but its execution result could not be
    /// resolved. Must not happen for sealed heights.
    #[error("missing execution result for sealed height {0}")]
    MissingExecutionResult(Height),

    #[error("sealed block lookup failed: {0}")]
    Backend(String),
}

/// Read-only, height-indexed view onto the host node's sealed chain.
///
/// The requester never dispatches a height beyond `highest_sealed()` at the
/// moment of the dispatch decision, so `block_at` failing for a height at or
/// below that watermark is fatal.
#[async_trait]
pub trait SealedBlockSource: Send + Sync {
    async fn block_at(&self, height: Height) -> Result<SealedBlock, SourceError>;

    /// Highest sealed height observed so far, or `None` before the first
    /// seal.
    async fn highest_sealed(&self) -> Option<Height>;
}

#[async_trait]
impl<S: SealedBlockSource + ?Sized> SealedBlockSource for Arc<S> {
    async fn block_at(&self, height: Height) -> Result<SealedBlock, SourceError> {
        (**self).block_at(height).await
    }

    async fn highest_sealed(&self) -> Option<Height> {
        (**self).highest_sealed().await
    }
}
