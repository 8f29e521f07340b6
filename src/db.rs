use std::sync::Arc;

use cranedb_query::{MetadataManager, Planner};
use cranedb_storage::{BufferManager, FileManager, LockTable, LogManager, Transaction};
use tracing::info;

use crate::config::Config;
use crate::prelude::Error;

/// One running database: the shared storage managers, the catalog, and the
/// planner. Created once at startup; every session draws its transactions
/// from here.
///
/// Opening a fresh data directory bootstraps the catalog tables; opening
/// an existing one runs log recovery first, so uncommitted work from a
/// crashed run is undone before any session starts.
#[derive(Debug)]
pub struct Database {
    fm: Arc<FileManager>,
    lm: Arc<LogManager>,
    bm: Arc<BufferManager>,
    locks: Arc<LockTable>,
    metadata: Arc<MetadataManager>,
    planner: Planner,
}

impl Database {
    pub fn open(config: &Config) -> Result<Self, Error> {
        let fm = Arc::new(FileManager::new(&config.data_dir, config.block_size)?);
        let lm = Arc::new(LogManager::new(Arc::clone(&fm), &config.log_file)?);
        let bm = Arc::new(BufferManager::new(
            Arc::clone(&fm),
            Arc::clone(&lm),
            config.buffer_count,
            config.max_wait(),
        ));
        let locks = Arc::new(LockTable::new(config.max_wait()));

        let is_new = fm.is_new();
        let tx = Arc::new(Transaction::new(
            Arc::clone(&fm),
            Arc::clone(&lm),
            Arc::clone(&bm),
            Arc::clone(&locks),
        )?);

        if is_new {
            info!(dir = %config.data_dir.display(), "creating new database");
        } else {
            info!(dir = %config.data_dir.display(), "opening existing database");
            tx.recover()?;
        }

        let metadata = Arc::new(MetadataManager::new(is_new, &tx)?);
        tx.commit()?;

        Ok(Self {
            fm,
            lm,
            bm,
            locks,
            planner: Planner::new(Arc::clone(&metadata)),
            metadata,
        })
    }

    pub fn new_tx(&self) -> Result<Arc<Transaction>, Error> {
        Ok(Arc::new(Transaction::new(
            Arc::clone(&self.fm),
            Arc::clone(&self.lm),
            Arc::clone(&self.bm),
            Arc::clone(&self.locks),
        )?))
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn metadata(&self) -> &Arc<MetadataManager> {
        &self.metadata
    }
}
