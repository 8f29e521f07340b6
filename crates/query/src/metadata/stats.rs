use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use cranedb_core::{Layout, QueryError, Value};
use cranedb_storage::{TableScan, Transaction};
use tracing::debug;

/// Number of lookups between wholesale cache refreshes. Deliberately
/// coarse: mutations between refreshes go unnoticed.
const REFRESH_CALLS: usize = 100;

/// Statistics for one table: block count, record count, and the number of
/// distinct values per field.
#[derive(Debug, Clone)]
pub struct StatInfo {
    blocks: i64,
    records: i64,
    distinct: HashMap<String, i64>,
}

impl StatInfo {
    pub fn new<S, I>(blocks: i64, records: i64, distinct: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, i64)>,
    {
        Self {
            blocks,
            records,
            distinct: distinct.into_iter().map(|(f, n)| (f.into(), n)).collect(),
        }
    }

    pub fn blocks_accessed(&self) -> i64 {
        self.blocks
    }

    pub fn records_output(&self) -> i64 {
        self.records
    }

    /// Distinct values of the field; a rough guess for fields the scan
    /// never measured.
    pub fn distinct_values(&self, field: &str) -> i64 {
        self.distinct
            .get(field)
            .copied()
            .unwrap_or(1 + self.records / 3)
    }
}

/// Lazy per-table statistics cache. Misses recompute by a full table scan;
/// every `REFRESH_CALLS` lookups the whole cache is invalidated so the
/// numbers track table growth eventually.
#[derive(Debug, Default)]
pub struct StatManager {
    cache: HashMap<String, StatInfo>,
    calls: usize,
}

impl StatManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stat_info(
        &mut self,
        table: &str,
        layout: &Layout,
        tx: &Arc<Transaction>,
    ) -> Result<StatInfo, QueryError> {
        self.calls += 1;
        if self.calls > REFRESH_CALLS {
            debug!("refreshing statistics cache");
            self.cache.clear();
            self.calls = 0;
        }

        if let Some(stats) = self.cache.get(table) {
            return Ok(stats.clone());
        }

        let stats = calc_table_stats(table, layout, tx)?;
        self.cache.insert(table.to_string(), stats.clone());

        Ok(stats)
    }
}

/// Walk the whole table once, counting records and blocks and collecting
/// the distinct values of every field.
fn calc_table_stats(
    table: &str,
    layout: &Layout,
    tx: &Arc<Transaction>,
) -> Result<StatInfo, QueryError> {
    let mut records = 0i64;
    let mut blocks = 0i64;
    let mut values: HashMap<&str, HashSet<Value>> = layout
        .schema()
        .fields()
        .iter()
        .map(|f| (f.as_str(), HashSet::new()))
        .collect();

    let mut scan = TableScan::new(Arc::clone(tx), table, layout.clone())?;
    while scan.next()? {
        records += 1;
        blocks = blocks.max(scan.rid()?.block as i64 + 1);

        for (field, seen) in values.iter_mut() {
            seen.insert(scan.get_value(field)?);
        }
    }
    scan.close()?;

    debug!(table, records, blocks, "computed table statistics");

    Ok(StatInfo {
        blocks,
        records,
        distinct: values
            .into_iter()
            .map(|(f, seen)| (f.to_string(), seen.len() as i64))
            .collect(),
    })
}
