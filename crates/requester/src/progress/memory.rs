use std::sync::Mutex;

use async_trait::async_trait;
use viridian_types::Height;

use super::{check_notified, check_processed, Progress, ProgressStore, ProgressStoreError};

/// In-memory [`ProgressStore`] for tests.
#[derive(Default)]
pub struct MemoryProgressStore {
    progress: Mutex<Progress>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a pre-existing snapshot, as a store reopened after a crash
    /// would.
    pub fn with_progress(progress: Progress) -> Self {
        Self { progress: Mutex::new(progress) }
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn read(&self) -> Result<Progress, ProgressStoreError> {
        Ok(*self.progress.lock().unwrap())
    }

    async fn set_processed(&self, height: Height) -> Result<(), ProgressStoreError> {
        let mut progress = self.progress.lock().unwrap();
        check_processed(progress.processed, height)?;
        progress.processed = Some(height);
        Ok(())
    }

    async fn set_notified(&self, height: Height) -> Result<(), ProgressStoreError> {
        let mut progress = self.progress.lock().unwrap();
        check_notified(progress.notified, progress.processed, height)?;
        progress.notified = Some(height);
        Ok(())
    }

    async fn set_halted(&self) -> Result<(), ProgressStoreError> {
        self.progress.lock().unwrap().halted = true;
        Ok(())
    }
}
