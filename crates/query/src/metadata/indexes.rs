use std::collections::HashMap;
use std::sync::Arc;

use cranedb_core::{Layout, QueryError, Schema, SqlType};
use cranedb_storage::index::bucket_layout;
use cranedb_storage::{HashIndex, TableScan, Transaction};

use super::stats::StatInfo;
use super::tables::{TableManager, MAX_NAME};

pub const INDEX_CATALOG: &str = "index_catalog";

/// Tracks indexes in `index_catalog(index_name, table_name, field_name)`
/// and hands out `IndexInfo` descriptors for planning.
#[derive(Debug)]
pub struct IndexManager {
    catalog_layout: Layout,
}

impl IndexManager {
    pub fn new(
        is_new: bool,
        tables: &TableManager,
        tx: &Arc<Transaction>,
    ) -> Result<Self, QueryError> {
        let mut schema = Schema::new();
        schema.add_string_field("index_name", MAX_NAME);
        schema.add_string_field("table_name", MAX_NAME);
        schema.add_string_field("field_name", MAX_NAME);

        if is_new {
            tables.create_table(INDEX_CATALOG, schema.clone(), tx)?;
        }

        Ok(Self {
            catalog_layout: Layout::new(schema),
        })
    }

    pub fn create_index(
        &self,
        name: &str,
        table: &str,
        field: &str,
        tx: &Arc<Transaction>,
    ) -> Result<(), QueryError> {
        let mut scan = TableScan::new(Arc::clone(tx), INDEX_CATALOG, self.catalog_layout.clone())?;

        scan.insert()?;
        scan.set_string("index_name", name)?;
        scan.set_string("table_name", table)?;
        scan.set_string("field_name", field)?;
        scan.close()?;

        Ok(())
    }

    /// Every index on the table, keyed by the indexed field. The caller
    /// supplies the table's layout and statistics, which the descriptors
    /// base their estimates on.
    pub fn index_info(
        &self,
        table: &str,
        table_layout: &Layout,
        stats: StatInfo,
        tx: &Arc<Transaction>,
    ) -> Result<HashMap<String, IndexInfo>, QueryError> {
        let mut result = HashMap::new();

        let mut scan = TableScan::new(Arc::clone(tx), INDEX_CATALOG, self.catalog_layout.clone())?;
        while scan.next()? {
            if scan.get_string("table_name")? != table {
                continue;
            }

            let index_name = scan.get_string("index_name")?;
            let field_name = scan.get_string("field_name")?;

            let Some(info) = table_layout.schema().info(&field_name) else {
                return Err(QueryError::UnknownField(field_name));
            };

            result.insert(
                field_name.clone(),
                IndexInfo {
                    index_name,
                    field_name,
                    field_type: info.sql_type,
                    field_length: info.length,
                    stats: stats.clone(),
                    tx: Arc::clone(tx),
                },
            );
        }
        scan.close()?;

        Ok(result)
    }
}

/// Planning-time descriptor of one index: enough to open it and to
/// estimate the cost of probing it.
#[derive(Debug, Clone)]
pub struct IndexInfo {
    index_name: String,
    field_name: String,
    field_type: SqlType,
    field_length: usize,
    stats: StatInfo,
    tx: Arc<Transaction>,
}

impl IndexInfo {
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn open(&self) -> HashIndex {
        HashIndex::new(
            Arc::clone(&self.tx),
            &self.index_name,
            self.bucket_layout(),
        )
    }

    /// Estimated block accesses for one probe: the bucket files jointly
    /// hold one entry per table record, so size the entry file in blocks
    /// and take one bucket's share.
    pub fn blocks_accessed(&self) -> i64 {
        let entries_per_block = (self.tx.block_size() / self.bucket_layout().slot_size()).max(1);
        let entry_blocks = self.stats.records_output() / entries_per_block as i64;

        HashIndex::search_cost(entry_blocks as u64) as i64
    }

    /// Estimated matches for one key: the table's records spread over the
    /// indexed field's distinct values.
    pub fn records_output(&self) -> i64 {
        self.stats.records_output() / self.stats.distinct_values(&self.field_name).max(1)
    }

    pub fn distinct_values(&self, field: &str) -> i64 {
        if field == self.field_name {
            1
        } else {
            self.stats.distinct_values(field)
        }
    }

    fn bucket_layout(&self) -> Layout {
        bucket_layout(self.field_type, self.field_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranedb_testing::test_tx;

    #[test]
    fn index_info_is_keyed_by_field() {
        let (_db, tx) = test_tx();
        let tables = TableManager::new(true, &tx).unwrap();
        let indexes = IndexManager::new(true, &tables, &tx).unwrap();

        let mut schema = Schema::new();
        schema.add_int_field("id");
        schema.add_int_field("age");
        tables.create_table("t", schema, &tx).unwrap();

        indexes.create_index("t_age", "t", "age", &tx).unwrap();

        let layout = tables.layout("t", &tx).unwrap();
        let stats = StatInfo::new(5, 100, [("id", 100), ("age", 25)]);
        let infos = indexes.index_info("t", &layout, stats, &tx).unwrap();

        assert_eq!(infos.len(), 1);
        let info = &infos["age"];
        assert_eq!(info.index_name(), "t_age");
        assert_eq!(info.records_output(), 4);
        assert_eq!(info.distinct_values("age"), 1);
        assert_eq!(info.distinct_values("id"), 100);

        tx.commit().unwrap();
    }
}
