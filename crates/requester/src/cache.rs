//! In-memory view of fetched-but-unnotified heights.
//!
//! The cache is a passive data structure: the fetch pool inserts entries,
//! the notify worker drains them in strict height order. It also carries
//! the flow-control decisions (search-ahead pause, halt) and mirrors the
//! persisted checkpoints it depends on.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use tokio::sync::Notify;
use tracing::{debug, trace};
use viridian_execution_data::ExecutionData;
use viridian_types::{BlockId, ExecutionDataId, Height};

use crate::{
    progress::{Progress, ProgressStore, ProgressStoreError},
    sequencer::DenseCursor,
};

/// A block whose execution data has been requested.
///
/// The payload is populated when the fetch succeeds and may later be evicted
/// from memory; the durable copy in the local blob store is never dropped.
#[derive(Clone, Debug)]
pub struct BlockEntry {
    pub block_id: BlockId,
    pub height: Height,
    pub execution_data_id: ExecutionDataId,
    pub execution_data: Option<Arc<ExecutionData>>,
}

struct CacheState {
    entries: BTreeMap<Height, BlockEntry>,
    highest_fetched: Option<Height>,
    last_notified: Option<Height>,
    halted: bool,
}

pub(crate) struct StatusCache {
    state: Mutex<CacheState>,
    progress: Arc<dyn ProgressStore>,
    cursor: Arc<DenseCursor>,
    notify_wake: Arc<Notify>,
    start_height: Height,
    max_cached_entries: u64,
    max_search_ahead: u64,
}

impl StatusCache {
    pub(crate) fn new(
        start_height: Height,
        max_cached_entries: u64,
        max_search_ahead: u64,
        progress: Arc<dyn ProgressStore>,
        cursor: Arc<DenseCursor>,
        notify_wake: Arc<Notify>,
    ) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: BTreeMap::new(),
                highest_fetched: None,
                last_notified: None,
                halted: false,
            }),
            progress,
            cursor,
            notify_wake,
            start_height,
            max_cached_entries,
            max_search_ahead,
        }
    }

    /// Prime the in-memory state from a persisted snapshot. Every processed
    /// height has a durable local copy, so the fetched watermark resumes at
    /// the processed checkpoint.
    pub(crate) fn load(&self, progress: Progress) {
        let mut state = self.state.lock().unwrap();
        state.last_notified = progress.notified;
        state.highest_fetched = progress.processed;
        state.halted = progress.halted;
    }

    /// Record a downloaded entry and wake the notify worker.
    ///
    /// When over capacity the highest cached height is dropped: it is the
    /// furthest from being notified and can be reread from the local store.
    pub(crate) fn fetched(&self, entry: BlockEntry) {
        let mut state = self.state.lock().unwrap();
        if state.halted {
            return;
        }

        let height = entry.height;
        if state.highest_fetched.is_none_or(|h| height > h) {
            state.highest_fetched = Some(height);
        }
        state.entries.insert(height, entry);

        while state.entries.len() as u64 > self.max_cached_entries {
            if let Some((evicted, _)) = state.entries.pop_last() {
                trace!(height = %evicted, "evicting cached execution data");
            }
        }
        drop(state);

        self.notify_wake.notify_one();
    }

    /// The next height due for notification, if its fetch has been committed.
    ///
    /// Notifications are strictly contiguous: the height after the last
    /// notified one is returned only once the dense processed cursor has
    /// reached it.
    pub(crate) fn next_to_notify(&self) -> Option<Height> {
        let state = self.state.lock().unwrap();
        if state.halted {
            return None;
        }

        let candidate = match state.last_notified {
            Some(h) => h.increment(),
            None => self.start_height,
        };

        let fetched = state.highest_fetched.is_some_and(|h| candidate <= h);
        let committed = self.cursor.get().is_some_and(|h| candidate <= h);
        (fetched && committed).then_some(candidate)
    }

    /// The cached entry for `height`, if it has not been evicted.
    pub(crate) fn get_entry(&self, height: Height) -> Option<BlockEntry> {
        self.state.lock().unwrap().entries.get(&height).cloned()
    }

    /// Persist the notified checkpoint and drop the entry from memory.
    pub(crate) async fn mark_notified(&self, height: Height) -> Result<(), ProgressStoreError> {
        self.progress.set_notified(height).await?;

        let mut state = self.state.lock().unwrap();
        state.last_notified = Some(height);
        state.entries.remove(&height);
        debug!(height = %height, "notified");
        Ok(())
    }

    /// Exclusive upper bound on dispatchable heights: the fetch pool may
    /// only claim heights below `next notification + max_search_ahead`, so
    /// the number of fetched-but-unnotified heights can never exceed the
    /// search-ahead cap even with a full worker pool in flight.
    pub(crate) fn dispatch_limit(&self) -> Height {
        let state = self.state.lock().unwrap();
        let next_notify = match state.last_notified {
            Some(h) => h.increment(),
            None => self.start_height,
        };
        Height::new(next_notify.as_u64() + self.max_search_ahead)
    }

    /// True once the gap between fetched and notified heights has reached
    /// the search-ahead cap. The fetch pool stops claiming jobs until the
    /// notify worker catches up.
    pub(crate) fn should_pause_fetch(&self) -> bool {
        let state = self.state.lock().unwrap();
        let Some(highest_fetched) = state.highest_fetched else {
            return false;
        };

        let next_notify = match state.last_notified {
            Some(h) => h.increment(),
            None => self.start_height,
        };

        highest_fetched.as_u64() + 1 - next_notify.as_u64() >= self.max_search_ahead
    }

    /// Persist the halt flag and stop producing notifications.
    pub(crate) async fn halt(&self) -> Result<(), ProgressStoreError> {
        self.progress.set_halted().await?;

        self.state.lock().unwrap().halted = true;
        self.notify_wake.notify_one();
        Ok(())
    }

    pub(crate) fn halted(&self) -> bool {
        self.state.lock().unwrap().halted
    }
}
