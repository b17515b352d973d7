//! Startup datastore check.
//!
//! Walks every height that has already been notified and confirms its
//! execution data still resolves from the local store. Corrupted blobs are
//! deleted and the tree refetched; missing blobs trigger a refetch; invalid
//! blob structure halts the requester, since that data was already accepted
//! once and must not be repaired automatically.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use viridian_execution_data::{
    BlobIssueKind, BlobService, BlobStore, ExecutionDataService, LocalBlobService,
};
use viridian_types::Height;

use crate::{
    cache::StatusCache,
    error::RequesterError,
    fetcher::{FetchFailure, Fetcher},
    metrics::RequesterMetrics,
    source::SealedBlockSource,
};

pub(crate) struct ConsistencyChecker {
    pub(crate) start_height: Height,
    pub(crate) source: Arc<dyn SealedBlockSource>,
    /// Local-only service with hash-on-read, so silent disk corruption
    /// surfaces as a hash mismatch.
    pub(crate) local: ExecutionDataService<LocalBlobService<Arc<dyn BlobStore>>>,
    pub(crate) fetcher: Fetcher,
    pub(crate) cache: Arc<StatusCache>,
    pub(crate) metrics: RequesterMetrics,
    pub(crate) token: CancellationToken,
}

impl ConsistencyChecker {
    /// Check `[start_height, last_notified]` in ascending order. A check
    /// over a consistent store performs no writes.
    pub(crate) async fn run(&self, last_notified: Option<Height>) -> Result<(), RequesterError> {
        let Some(end) = last_notified else {
            debug!("nothing notified yet, skipping datastore check");
            return Ok(());
        };

        info!(start = %self.start_height, end = %end, "checking local execution data");

        let mut height = self.start_height;
        while height <= end {
            if self.token.is_cancelled() {
                return Ok(());
            }

            self.check_height(height).await?;
            height = height.increment();
        }

        info!(end = %end, "local execution data check complete");
        Ok(())
    }

    async fn check_height(&self, height: Height) -> Result<(), RequesterError> {
        let sealed = self
            .source
            .block_at(height)
            .await
            .map_err(|source| RequesterError::SealedLookup { height, source })?;

        let report = self
            .local
            .check(sealed.execution_data_id)
            .await
            .map_err(|source| RequesterError::LocalData { height, source })?;

        if let Some(issue) = report.invalid() {
            // invalid structure was accepted when this height was first
            // fetched; only an operator can resolve that
            error!(
                height = %height,
                execution_data_id = %sealed.execution_data_id,
                blob_id = %issue.id,
                kind = ?issue.kind,
                "HALTING: invalid execution data found in local store"
            );
            self.cache.halt().await?;
            self.metrics.record_halted();
            return Err(RequesterError::Halted);
        }

        let mut needs_refetch = false;
        for issue in report.repairable() {
            needs_refetch = true;
            match issue.kind {
                BlobIssueKind::HashMismatch => {
                    warn!(
                        height = %height,
                        blob_id = %issue.id,
                        "deleting corrupted blob from local store"
                    );
                    self.local
                        .blob_service()
                        .delete(issue.id)
                        .await
                        .map_err(|source| RequesterError::LocalData { height, source })?;
                }
                _ => {
                    debug!(height = %height, blob_id = %issue.id, "blob missing from local store");
                }
            }
        }

        if needs_refetch {
            info!(height = %height, "refetching execution data for inconsistent height");
            match self
                .fetcher
                .fetch_with_retry(sealed.execution_data_id, height, &self.token)
                .await
            {
                // the fetch already wrote the tree back to the local store
                Ok(_) => {}
                Err(FetchFailure::Cancelled) => {}
                Err(FetchFailure::Invalid(err)) => {
                    error!(
                        height = %height,
                        execution_data_id = %sealed.execution_data_id,
                        error = %err,
                        "HALTING: invalid execution data found"
                    );
                    self.cache.halt().await?;
                    self.metrics.record_halted();
                    return Err(RequesterError::Halted);
                }
                Err(FetchFailure::LocalWrite(source)) => {
                    return Err(RequesterError::LocalData { height, source });
                }
            }
        }

        Ok(())
    }
}
