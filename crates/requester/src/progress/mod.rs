use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use viridian_types::Height;

pub mod memory;
pub mod redb;

pub use memory::MemoryProgressStore;
pub use redb::RedbProgressStore;

/// Snapshot of the persisted requester progress.
///
/// `None` means "nothing yet": with `start_height == 0` there is no height
/// below the first one, so the checkpoints are options rather than
/// `start - 1` sentinels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    /// Highest height whose fetch has been committed, dense from the start
    /// height.
    pub processed: Option<Height>,
    /// Highest height whose subscriber fan-out has completed.
    pub notified: Option<Height>,
    /// One-way flag: invalid sealed data was encountered.
    pub halted: bool,
}

#[derive(Debug, Error)]
pub enum ProgressStoreError {
    /// A checkpoint may never move backwards.
    #[error("checkpoint {key} may not regress from {current} to {requested}")]
    Regression { key: &'static str, current: Height, requested: Height },

    /// `notified` may never overtake `processed`.
    #[error("notified checkpoint {requested} is ahead of processed checkpoint {processed:?}")]
    NotifiedAheadOfProcessed { requested: Height, processed: Option<Height> },

    #[error("database error: {0}")]
    Database(#[from] ::redb::DatabaseError),

    #[error("storage error: {0}")]
    Storage(#[from] ::redb::StorageError),

    #[error("table error: {0}")]
    Table(#[from] ::redb::TableError),

    #[error("commit error: {0}")]
    Commit(#[from] ::redb::CommitError),

    #[error("transaction error: {0}")]
    Transaction(#[from] ::redb::TransactionError),

    #[error("failed to join on task: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// Escape hatch for store implementations outside this crate.
    #[error("progress store backend error: {0}")]
    Backend(String),
}

/// Durable monotonic checkpoints for the requester.
///
/// Each write is an independent atomic put; there is no cross-key
/// transaction requirement beyond the monotonicity checks.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn read(&self) -> Result<Progress, ProgressStoreError>;

    /// Advance the processed checkpoint. Fails if `height` regresses.
    async fn set_processed(&self, height: Height) -> Result<(), ProgressStoreError>;

    /// Advance the notified checkpoint. Fails if `height` regresses or is
    /// ahead of the processed checkpoint.
    async fn set_notified(&self, height: Height) -> Result<(), ProgressStoreError>;

    /// Persist the halt flag. Idempotent and irreversible.
    async fn set_halted(&self) -> Result<(), ProgressStoreError>;
}

#[async_trait]
impl<P: ProgressStore + ?Sized> ProgressStore for Arc<P> {
    async fn read(&self) -> Result<Progress, ProgressStoreError> {
        (**self).read().await
    }

    async fn set_processed(&self, height: Height) -> Result<(), ProgressStoreError> {
        (**self).set_processed(height).await
    }

    async fn set_notified(&self, height: Height) -> Result<(), ProgressStoreError> {
        (**self).set_notified(height).await
    }

    async fn set_halted(&self) -> Result<(), ProgressStoreError> {
        (**self).set_halted().await
    }
}

pub(crate) fn check_processed(
    current: Option<Height>,
    requested: Height,
) -> Result<(), ProgressStoreError> {
    match current {
        Some(current) if requested < current => Err(ProgressStoreError::Regression {
            key: "processed_height",
            current,
            requested,
        }),
        _ => Ok(()),
    }
}

pub(crate) fn check_notified(
    current: Option<Height>,
    processed: Option<Height>,
    requested: Height,
) -> Result<(), ProgressStoreError> {
    if let Some(current) = current {
        if requested < current {
            return Err(ProgressStoreError::Regression {
                key: "notified_height",
                current,
                requested,
            });
        }
    }
    if processed.is_none_or(|processed| requested > processed) {
        return Err(ProgressStoreError::NotifiedAheadOfProcessed { requested, processed });
    }
    Ok(())
}
