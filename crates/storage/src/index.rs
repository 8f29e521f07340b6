use std::sync::Arc;

use cranedb_core::{BlockNum, Layout, QueryError, Rid, SlotId, Value};
use xxhash_rust::xxh3::xxh3_64;

use crate::scan::TableScan;
use crate::tx::Transaction;

/// Number of buckets every hash index is spread over. Static: buckets are
/// never split or merged.
pub const NUM_BUCKETS: u64 = 100;

/// Field names of the bucket table records.
pub const BLOCK_FIELD: &str = "block";
pub const ID_FIELD: &str = "id";
pub const DATA_FIELD: &str = "dataval";

/// A static hash index. Each bucket is an ordinary table file named
/// `<index_name><bucket>` whose records hold a data RID (block plus slot)
/// and the indexed value. Lookup hashes the search key to one bucket and
/// scans it linearly.
#[derive(Debug)]
pub struct HashIndex {
    tx: Arc<Transaction>,
    index_name: String,
    layout: Layout,
    search_key: Option<Value>,
    scan: Option<TableScan>,
}

impl HashIndex {
    pub fn new(tx: Arc<Transaction>, index_name: &str, layout: Layout) -> Self {
        Self {
            tx,
            index_name: index_name.to_string(),
            layout,
            search_key: None,
            scan: None,
        }
    }

    /// Position the index just before the first entry matching the key by
    /// opening a scan on the key's bucket.
    pub fn before_first(&mut self, key: Value) -> Result<(), QueryError> {
        self.close()?;

        let bucket = xxh3_64(&key.hash_image()) % NUM_BUCKETS;
        let table = format!("{}{}", self.index_name, bucket);

        self.scan = Some(TableScan::new(
            Arc::clone(&self.tx),
            &table,
            self.layout.clone(),
        )?);
        self.search_key = Some(key);

        Ok(())
    }

    /// Advance to the next entry whose stored value equals the search key.
    pub fn next(&mut self) -> Result<bool, QueryError> {
        let Some(key) = self.search_key.clone() else {
            return Ok(false);
        };

        let scan = self.positioned()?;
        while scan.next()? {
            if scan.get_value(DATA_FIELD)? == key {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// The RID of the table record the current entry points at.
    pub fn data_rid(&mut self) -> Result<Rid, QueryError> {
        let scan = self.positioned()?;

        let block = scan.get_int(BLOCK_FIELD)? as u32 as BlockNum;
        let slot = scan.get_int(ID_FIELD)? as u32 as SlotId;

        Ok(Rid::new(block, slot))
    }

    /// Append one entry to the key's bucket.
    pub fn insert(&mut self, key: Value, rid: Rid) -> Result<(), QueryError> {
        self.before_first(key.clone())?;

        let scan = self.positioned()?;
        scan.insert()?;
        scan.set_int(BLOCK_FIELD, rid.block as i32)?;
        scan.set_int(ID_FIELD, rid.slot as i32)?;
        scan.set_value(DATA_FIELD, &key)?;

        Ok(())
    }

    /// Remove the entry matching the key and RID, if present.
    pub fn delete(&mut self, key: Value, rid: Rid) -> Result<(), QueryError> {
        self.before_first(key)?;

        while self.next()? {
            if self.data_rid()? == rid {
                self.positioned()?.delete()?;
                break;
            }
        }

        Ok(())
    }

    pub fn close(&mut self) -> Result<(), QueryError> {
        if let Some(mut scan) = self.scan.take() {
            scan.close()?;
        }
        self.search_key = None;
        Ok(())
    }

    /// Estimated block accesses for one lookup: the bucket's share of the
    /// entry blocks, rounded up since probing a non-empty bucket always
    /// touches at least one block.
    pub fn search_cost(num_blocks: u64) -> u64 {
        num_blocks.div_ceil(NUM_BUCKETS)
    }

    fn positioned(&mut self) -> Result<&mut TableScan, QueryError> {
        self.scan.as_mut().ok_or_else(|| {
            cranedb_core::StorageError::corrupt("hash index used before before_first").into()
        })
    }
}

/// The layout shared by every bucket table of an index over the given
/// field definition.
pub fn bucket_layout(key_type: cranedb_core::SqlType, key_length: usize) -> Layout {
    let mut schema = cranedb_core::Schema::new();
    schema.add_int_field(BLOCK_FIELD);
    schema.add_int_field(ID_FIELD);
    schema.add_field(DATA_FIELD, key_type, key_length);
    Layout::new(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferManager;
    use crate::concurrency::LockTable;
    use crate::file::FileManager;
    use crate::log::LogManager;
    use cranedb_core::SqlType;
    use std::time::Duration;

    fn tx() -> (tempfile::TempDir, Arc<Transaction>) {
        let dir = tempfile::tempdir().unwrap();
        let fm = Arc::new(FileManager::new(dir.path().join("db"), 400).unwrap());
        let lm = Arc::new(LogManager::new(Arc::clone(&fm), "cranedb.log").unwrap());
        let bm = Arc::new(BufferManager::new(
            Arc::clone(&fm),
            Arc::clone(&lm),
            8,
            Duration::from_secs(1),
        ));
        let locks = Arc::new(LockTable::new(Duration::from_secs(1)));
        (dir, Arc::new(Transaction::new(fm, lm, bm, locks).unwrap()))
    }

    #[test]
    fn inserted_entries_are_found_by_key() {
        let (_dir, tx) = tx();
        let mut index = HashIndex::new(
            Arc::clone(&tx),
            "idx_age",
            bucket_layout(SqlType::Int, 4),
        );

        for n in 0..20 {
            index.insert(Value::Int(n % 4), Rid::new(0, n as usize)).unwrap();
        }

        index.before_first(Value::Int(3)).unwrap();
        let mut hits = Vec::new();
        while index.next().unwrap() {
            hits.push(index.data_rid().unwrap().slot);
        }
        hits.sort_unstable();

        assert_eq!(hits, vec![3, 7, 11, 15, 19]);

        index.close().unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn string_keys_are_case_sensitive() {
        let (_dir, tx) = tx();
        let mut index = HashIndex::new(
            Arc::clone(&tx),
            "idx_name",
            bucket_layout(SqlType::Varchar, 10),
        );

        index.insert(Value::from("John"), Rid::new(0, 0)).unwrap();
        index.insert(Value::from("john"), Rid::new(0, 1)).unwrap();

        index.before_first(Value::from("John")).unwrap();
        assert!(index.next().unwrap());
        assert_eq!(index.data_rid().unwrap(), Rid::new(0, 0));
        assert!(!index.next().unwrap());

        index.close().unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn delete_removes_only_the_matching_rid() {
        let (_dir, tx) = tx();
        let mut index = HashIndex::new(
            Arc::clone(&tx),
            "idx_age",
            bucket_layout(SqlType::Int, 4),
        );

        index.insert(Value::Int(25), Rid::new(1, 0)).unwrap();
        index.insert(Value::Int(25), Rid::new(1, 1)).unwrap();
        index.delete(Value::Int(25), Rid::new(1, 0)).unwrap();

        index.before_first(Value::Int(25)).unwrap();
        assert!(index.next().unwrap());
        assert_eq!(index.data_rid().unwrap(), Rid::new(1, 1));
        assert!(!index.next().unwrap());

        index.close().unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn search_cost_divides_by_bucket_count_rounding_up() {
        assert_eq!(HashIndex::search_cost(1000), 10);
        assert_eq!(HashIndex::search_cost(50), 1);
        assert_eq!(HashIndex::search_cost(101), 2);
        assert_eq!(HashIndex::search_cost(0), 0);
    }
}
