//! Height job sequencing for the fetch pool.
//!
//! Heights are dispatched in ascending order, one claim per height, and may
//! complete in any order. The dense `processed` checkpoint only advances
//! across contiguous completions; completions that land early wait in a heap
//! until the gap below them closes.

use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use viridian_types::Height;

use crate::progress::{ProgressStore, ProgressStoreError};

/// Lock-free view of the dense processed cursor, shared with the status
/// cache so notification gating never runs ahead of committed fetches.
///
/// Encoding: `0` means nothing processed yet, otherwise `height + 1`.
#[derive(Debug, Default)]
pub(crate) struct DenseCursor(AtomicU64);

impl DenseCursor {
    pub(crate) fn get(&self) -> Option<Height> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            raw => Some(Height::new(raw - 1)),
        }
    }

    fn set(&self, height: Height) {
        self.0.store(height.as_u64() + 1, Ordering::Release);
    }
}

struct SeqState {
    next_dispatch: Height,
    /// Completed heights above the dense cursor, min-first.
    early: BinaryHeap<Reverse<u64>>,
    processed: Option<Height>,
}

pub(crate) struct HeightSequencer {
    start_height: Height,
    state: Mutex<SeqState>,
    cursor: Arc<DenseCursor>,
    /// Serializes checkpoint persistence so two workers can never write the
    /// processed key out of order.
    commit_lock: tokio::sync::Mutex<()>,
    progress: Arc<dyn ProgressStore>,
}

impl HeightSequencer {
    pub(crate) fn new(start_height: Height, progress: Arc<dyn ProgressStore>) -> Self {
        Self {
            start_height,
            state: Mutex::new(SeqState {
                next_dispatch: start_height,
                early: BinaryHeap::new(),
                processed: None,
            }),
            cursor: Arc::new(DenseCursor::default()),
            commit_lock: tokio::sync::Mutex::new(()),
            progress,
        }
    }

    pub(crate) fn cursor(&self) -> Arc<DenseCursor> {
        Arc::clone(&self.cursor)
    }

    /// Resume from a persisted checkpoint. Runs once, during bootstrap,
    /// before any worker claims a job.
    pub(crate) fn resume(&self, processed: Option<Height>) {
        let mut state = self.state.lock().unwrap();
        state.processed = processed;
        state.next_dispatch = match processed {
            Some(h) => h.increment(),
            None => self.start_height,
        };
        if let Some(h) = processed {
            self.cursor.set(h);
        }
    }

    /// Claim the next height, if one is available for dispatch: at or below
    /// the seal watermark, below the search-ahead limit, and not paused.
    ///
    /// A claim is handed out exactly once; the caller owns the height until
    /// it calls [`complete`](Self::complete), retrying internally as needed.
    pub(crate) fn try_claim(
        &self,
        highest_sealed: Option<Height>,
        paused: bool,
        limit: Height,
    ) -> Option<Height> {
        if paused {
            return None;
        }

        let mut state = self.state.lock().unwrap();
        match highest_sealed {
            Some(sealed) if state.next_dispatch <= sealed && state.next_dispatch < limit => {
                let height = state.next_dispatch;
                state.next_dispatch = height.increment();
                Some(height)
            }
            _ => None,
        }
    }

    /// Record a finished height and commit any newly contiguous run to the
    /// progress store. Returns the new dense checkpoint if it advanced.
    pub(crate) async fn complete(
        &self,
        height: Height,
    ) -> Result<Option<Height>, ProgressStoreError> {
        let _commit = self.commit_lock.lock().await;

        let advanced = {
            let mut state = self.state.lock().unwrap();
            state.early.push(Reverse(height.as_u64()));

            let mut advanced = None;
            loop {
                let expected = match state.processed {
                    Some(h) => h.increment(),
                    None => self.start_height,
                };
                match state.early.peek() {
                    Some(&Reverse(h)) if h == expected.as_u64() => {
                        state.early.pop();
                        state.processed = Some(expected);
                        advanced = Some(expected);
                    }
                    _ => break,
                }
            }
            advanced
        };

        if let Some(processed) = advanced {
            // persisted before the cursor moves, so notification can never
            // outrun the durable checkpoint
            self.progress.set_processed(processed).await?;
            self.cursor.set(processed);
        }

        Ok(advanced)
    }
}
