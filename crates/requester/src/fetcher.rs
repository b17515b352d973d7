//! Downloading execution-data trees with retry.
//!
//! A single attempt runs the network get under the per-attempt deadline and
//! then mirrors the tree into the local store *outside* that deadline, so a
//! timeout can never abort the write. The retry wrapper backs off
//! exponentially and never gives up on transient failures; invalid data and
//! local-write failures surface immediately.

use std::{sync::Arc, time::Duration};

use rand::Rng;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use viridian_execution_data::{
    BlobService, ExecutionData, ExecutionDataError, ExecutionDataService,
};
use viridian_types::{ExecutionDataId, Height};

use crate::metrics::RequesterMetrics;

/// Terminal outcomes of a retry-wrapped fetch. Transient failures never
/// appear here; they are retried forever.
#[derive(Debug, Error)]
pub(crate) enum FetchFailure {
    #[error("fetch cancelled")]
    Cancelled,

    /// The sealed result committed to unusable data.
    #[error("invalid execution data: {0}")]
    Invalid(#[source] ExecutionDataError),

    /// The local store rejected the write-back of a fetched tree.
    #[error("failed to persist execution data locally: {0}")]
    LocalWrite(#[source] ExecutionDataError),
}

enum AttemptError {
    Transient(ExecutionDataError),
    Timeout,
    Invalid(ExecutionDataError),
    LocalWrite(ExecutionDataError),
}

#[derive(Clone)]
pub(crate) struct Fetcher {
    service: ExecutionDataService<Arc<dyn BlobService>>,
    fetch_timeout: Duration,
    retry_delay: Duration,
    max_retry_delay: Duration,
    metrics: RequesterMetrics,
}

impl Fetcher {
    pub(crate) fn new(
        service: ExecutionDataService<Arc<dyn BlobService>>,
        fetch_timeout: Duration,
        retry_delay: Duration,
        max_retry_delay: Duration,
        metrics: RequesterMetrics,
    ) -> Self {
        Self { service, fetch_timeout, retry_delay, max_retry_delay, metrics }
    }

    /// Fetch the tree rooted at `id`, retrying transient failures forever
    /// with capped exponential backoff.
    pub(crate) async fn fetch_with_retry(
        &self,
        id: ExecutionDataId,
        height: Height,
        token: &CancellationToken,
    ) -> Result<ExecutionData, FetchFailure> {
        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                self.metrics.record_fetch_retried();
            }

            let outcome = tokio::select! {
                _ = token.cancelled() => return Err(FetchFailure::Cancelled),
                outcome = self.attempt(id, height) => outcome,
            };

            let err = match outcome {
                Ok(data) => return Ok(data),
                Err(AttemptError::Invalid(err)) => return Err(FetchFailure::Invalid(err)),
                Err(AttemptError::LocalWrite(err)) => return Err(FetchFailure::LocalWrite(err)),
                Err(AttemptError::Timeout) => {
                    format!("deadline of {:?} exceeded", self.fetch_timeout)
                }
                Err(AttemptError::Transient(err)) => err.to_string(),
            };

            let delay = retry_backoff(self.retry_delay, self.max_retry_delay, attempt);
            warn!(
                height = %height,
                execution_data_id = %id,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "failed to get execution data, retrying"
            );

            tokio::select! {
                _ = token.cancelled() => return Err(FetchFailure::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            attempt = attempt.saturating_add(1);
        }
    }

    /// One download attempt, recorded in the fetch metrics.
    async fn attempt(
        &self,
        id: ExecutionDataId,
        height: Height,
    ) -> Result<ExecutionData, AttemptError> {
        self.metrics.record_fetch_started();
        let start = Instant::now();

        let result = self.attempt_inner(id).await;
        self.metrics.record_fetch_finished(start.elapsed(), result.is_ok(), height);

        if result.is_ok() {
            debug!(height = %height, execution_data_id = %id, "fetched execution data");
        }
        result
    }

    async fn attempt_inner(&self, id: ExecutionDataId) -> Result<ExecutionData, AttemptError> {
        let data = match tokio::time::timeout(self.fetch_timeout, self.service.get(id)).await {
            Err(_) => return Err(AttemptError::Timeout),
            Ok(Err(err)) if err.is_invalid() => return Err(AttemptError::Invalid(err)),
            Ok(Err(err)) => return Err(AttemptError::Transient(err)),
            Ok(Ok(data)) => data,
        };

        // deliberately not under the fetch deadline
        self.service.add(&data).await.map_err(AttemptError::LocalWrite)?;

        Ok(data)
    }
}

/// Backoff for `attempt` (zero-based): `retry_delay * 2^attempt`, capped,
/// with ±15% jitter.
fn retry_backoff(retry_delay: Duration, max_retry_delay: Duration, attempt: u32) -> Duration {
    let base = retry_delay.saturating_mul(2u32.saturating_pow(attempt.min(16)));
    let capped = base.min(max_retry_delay);

    let jitter = rand::thread_rng().gen_range(0.85..=1.15);
    capped.mul_f64(jitter)
}
