use thiserror::Error;
use viridian_execution_data::ExecutionDataError;
use viridian_types::Height;

use crate::{progress::ProgressStoreError, source::SourceError};

/// Fatal errors surfaced by the requester.
///
/// Transient fetch failures never appear here; they are absorbed by the
/// retry loop. Anything that does reach this type stops the component.
#[derive(Debug, Error)]
pub enum RequesterError {
    /// Invalid execution data was committed by a sealed result. The halt
    /// flag has been persisted: the requester refuses to run until an
    /// operator wipes its state.
    #[error("requester was halted due to invalid execution data")]
    Halted,

    /// A sealed block or its execution result could not be resolved. Sealing
    /// guarantees both exist, so this is a broken host node.
    #[error("sealed block lookup failed at height {height}: {source}")]
    SealedLookup {
        height: Height,
        #[source]
        source: SourceError,
    },

    /// The local blob store rejected a write, or execution data persisted at
    /// fetch time could not be read back for notification.
    #[error("local execution data access failed at height {height}: {source}")]
    LocalData {
        height: Height,
        #[source]
        source: ExecutionDataError,
    },

    #[error("progress store error: {0}")]
    Progress(#[from] ProgressStoreError),

    /// A worker task died without reporting a requester error.
    #[error("worker task failed: {0}")]
    Worker(String),
}

impl RequesterError {
    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Halted)
    }
}
