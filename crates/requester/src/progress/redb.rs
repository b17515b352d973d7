use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use viridian_types::Height;

use super::{check_notified, check_processed, Progress, ProgressStore, ProgressStoreError};

const PROGRESS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("requester_progress");

const KEY_PROCESSED: &str = "processed_height";
const KEY_NOTIFIED: &str = "notified_height";
const KEY_HALTED: &str = "halted";

struct Db {
    db: redb::Database,
}

impl Db {
    fn new(path: impl AsRef<Path>) -> Result<Self, ProgressStoreError> {
        Ok(Self { db: redb::Database::create(path)? })
    }

    fn create_tables(&self) -> Result<(), ProgressStoreError> {
        let tx = self.db.begin_write()?;
        // implicitly creates the table if it does not exist yet
        let _ = tx.open_table(PROGRESS_TABLE)?;
        tx.commit()?;
        Ok(())
    }

    fn read(&self) -> Result<Progress, ProgressStoreError> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(PROGRESS_TABLE)?;

        let processed = table.get(KEY_PROCESSED)?.map(|v| Height::new(v.value()));
        let notified = table.get(KEY_NOTIFIED)?.map(|v| Height::new(v.value()));
        let halted = table.get(KEY_HALTED)?.is_some_and(|v| v.value() != 0);

        Ok(Progress { processed, notified, halted })
    }

    fn set_processed(&self, height: Height) -> Result<(), ProgressStoreError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(PROGRESS_TABLE)?;
            let current = table.get(KEY_PROCESSED)?.map(|v| Height::new(v.value()));
            check_processed(current, height)?;
            table.insert(KEY_PROCESSED, height.as_u64())?;
        }
        tx.commit()?;
        Ok(())
    }

    fn set_notified(&self, height: Height) -> Result<(), ProgressStoreError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(PROGRESS_TABLE)?;
            let current = table.get(KEY_NOTIFIED)?.map(|v| Height::new(v.value()));
            let processed = table.get(KEY_PROCESSED)?.map(|v| Height::new(v.value()));
            check_notified(current, processed, height)?;
            table.insert(KEY_NOTIFIED, height.as_u64())?;
        }
        tx.commit()?;
        Ok(())
    }

    fn set_halted(&self) -> Result<(), ProgressStoreError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(PROGRESS_TABLE)?;
            table.insert(KEY_HALTED, 1)?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// Redb-backed [`ProgressStore`].
///
/// A single table holds the three fixed keys; every operation is one write
/// transaction, so each checkpoint advance is an independent atomic put.
#[derive(Clone)]
pub struct RedbProgressStore {
    db: Arc<Db>,
}

impl RedbProgressStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProgressStoreError> {
        let db = Db::new(path)?;
        db.create_tables()?;

        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl ProgressStore for RedbProgressStore {
    async fn read(&self) -> Result<Progress, ProgressStoreError> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || db.read()).await?
    }

    async fn set_processed(&self, height: Height) -> Result<(), ProgressStoreError> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || db.set_processed(height)).await?
    }

    async fn set_notified(&self, height: Height) -> Result<(), ProgressStoreError> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || db.set_notified(height)).await?
    }

    async fn set_halted(&self) -> Result<(), ProgressStoreError> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || db.set_halted()).await?
    }
}
