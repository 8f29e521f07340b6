//! Catalog and statistics metadata. Four bootstrapped system tables are
//! authoritative: `table_catalog`, `field_catalog`, `view_catalog`, and
//! `index_catalog`. They are ordinary heap tables read and written through
//! the same transactions as user data.

pub mod indexes;
pub mod stats;
pub mod tables;
pub mod views;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cranedb_core::{Layout, QueryError, Schema};
use cranedb_storage::Transaction;

pub use indexes::{IndexInfo, IndexManager};
pub use stats::{StatInfo, StatManager};
pub use tables::{TableManager, MAX_NAME};
pub use views::{ViewManager, MAX_VIEW};

/// Facade over the four catalog managers. Bootstraps every catalog table
/// when the database is new; the stats cache sits behind a mutex since it
/// is shared, lazily filled state.
#[derive(Debug)]
pub struct MetadataManager {
    tables: TableManager,
    views: ViewManager,
    indexes: IndexManager,
    stats: Mutex<StatManager>,
}

impl MetadataManager {
    pub fn new(is_new: bool, tx: &Arc<Transaction>) -> Result<Self, QueryError> {
        let tables = TableManager::new(is_new, tx)?;
        let views = ViewManager::new(is_new, &tables, tx)?;
        let indexes = IndexManager::new(is_new, &tables, tx)?;

        Ok(Self {
            tables,
            views,
            indexes,
            stats: Mutex::new(StatManager::new()),
        })
    }

    pub fn create_table(
        &self,
        name: &str,
        schema: Schema,
        tx: &Arc<Transaction>,
    ) -> Result<(), QueryError> {
        self.tables.create_table(name, schema, tx)
    }

    pub fn layout(&self, table: &str, tx: &Arc<Transaction>) -> Result<Layout, QueryError> {
        self.tables.layout(table, tx)
    }

    pub fn create_view(
        &self,
        name: &str,
        definition: &str,
        tx: &Arc<Transaction>,
    ) -> Result<(), QueryError> {
        self.views.create_view(name, definition, tx)
    }

    pub fn view_def(
        &self,
        name: &str,
        tx: &Arc<Transaction>,
    ) -> Result<Option<String>, QueryError> {
        self.views.view_def(name, tx)
    }

    pub fn create_index(
        &self,
        name: &str,
        table: &str,
        field: &str,
        tx: &Arc<Transaction>,
    ) -> Result<(), QueryError> {
        self.indexes.create_index(name, table, field, tx)
    }

    /// Every index on the table, keyed by indexed field.
    pub fn index_info(
        &self,
        table: &str,
        tx: &Arc<Transaction>,
    ) -> Result<HashMap<String, IndexInfo>, QueryError> {
        let layout = self.layout(table, tx)?;
        let stats = self.stat_info(table, &layout, tx)?;

        self.indexes.index_info(table, &layout, stats, tx)
    }

    /// Cached statistics for the table, recomputed by a full scan when the
    /// cache misses or the refresh threshold passes.
    pub fn stat_info(
        &self,
        table: &str,
        layout: &Layout,
        tx: &Arc<Transaction>,
    ) -> Result<StatInfo, QueryError> {
        let mut stats = self.stats.lock().unwrap();
        stats.stat_info(table, layout, tx)
    }
}
