use std::sync::Arc;

use cranedb_core::{BlockId, BlockNum, Layout, QueryError, Rid, SlotId, SqlType, StorageError, Value};

use crate::record::RecordPage;
use crate::tx::Transaction;

/// Heap scan over every record of a table file, block by block, slot by
/// slot. Positioned before the first record on construction. At any moment
/// the scan keeps exactly one record page pinned; moving between blocks
/// swaps the pin.
///
/// This is the leaf of every scan tree and the only scan that touches
/// disk. It also carries the full update surface: the update planner casts
/// down to it (through the select scan) for inserts, deletes, and writes.
#[derive(Debug)]
pub struct TableScan {
    tx: Arc<Transaction>,
    layout: Layout,
    file_name: String,
    page: Option<RecordPage>,
    current_slot: Option<SlotId>,
}

impl TableScan {
    pub fn new(tx: Arc<Transaction>, table_name: &str, layout: Layout) -> Result<Self, QueryError> {
        let file_name = format!("{table_name}.tbl");

        let mut scan = Self {
            tx,
            layout,
            file_name,
            page: None,
            current_slot: None,
        };

        if scan.tx.block_count(&scan.file_name)? == 0 {
            scan.move_to_new_block()?;
        } else {
            scan.move_to_block(0)?;
        }

        Ok(scan)
    }

    pub fn before_first(&mut self) -> Result<(), QueryError> {
        self.move_to_block(0)
    }

    /// Advance to the next record, crossing into the next block when the
    /// current page is exhausted. False once every block has been walked.
    pub fn next(&mut self) -> Result<bool, QueryError> {
        loop {
            let slot = self.page()?.next_used_slot(self.current_slot)?;

            if let Some(slot) = slot {
                self.current_slot = Some(slot);
                return Ok(true);
            }

            if self.at_last_block()? {
                return Ok(false);
            }

            let next = self.current_block()?.number() + 1;
            self.move_to_block(next)?;
        }
    }

    pub fn get_int(&self, field: &str) -> Result<i32, QueryError> {
        let slot = self.positioned_slot()?;
        Ok(self.page()?.get_int(slot, field)?)
    }

    pub fn get_string(&self, field: &str) -> Result<String, QueryError> {
        let slot = self.positioned_slot()?;
        Ok(self.page()?.get_string(slot, field)?)
    }

    pub fn get_value(&self, field: &str) -> Result<Value, QueryError> {
        match self.field_type(field)? {
            SqlType::Int => Ok(Value::Int(self.get_int(field)?)),
            SqlType::Varchar => Ok(Value::Text(self.get_string(field)?)),
        }
    }

    pub fn set_int(&self, field: &str, value: i32) -> Result<(), QueryError> {
        if self.field_type(field)? != SqlType::Int {
            return Err(QueryError::TypeMismatch(field.to_string()));
        }

        let slot = self.positioned_slot()?;
        Ok(self.page()?.set_int(slot, field, value)?)
    }

    pub fn set_string(&self, field: &str, value: &str) -> Result<(), QueryError> {
        if self.field_type(field)? != SqlType::Varchar {
            return Err(QueryError::TypeMismatch(field.to_string()));
        }

        // an overlong string would spill into the next field's bytes
        let max = self.layout.schema().length(field).unwrap_or(0);
        if value.len() > max {
            return Err(QueryError::ValueTooLong(field.to_string()));
        }

        let slot = self.positioned_slot()?;
        Ok(self.page()?.set_string(slot, field, value)?)
    }

    pub fn set_value(&self, field: &str, value: &Value) -> Result<(), QueryError> {
        match value {
            Value::Int(n) => self.set_int(field, *n),
            Value::Text(s) => self.set_string(field, s),
        }
    }

    /// Claim the next free slot, appending and formatting a fresh block
    /// when every page from the current position on is full.
    pub fn insert(&mut self) -> Result<(), QueryError> {
        loop {
            let slot = self.page()?.insert_slot(self.current_slot)?;

            if let Some(slot) = slot {
                self.current_slot = Some(slot);
                return Ok(());
            }

            if self.at_last_block()? {
                self.move_to_new_block()?;
            } else {
                let next = self.current_block()?.number() + 1;
                self.move_to_block(next)?;
            }
        }
    }

    pub fn delete(&self) -> Result<(), QueryError> {
        let slot = self.positioned_slot()?;
        Ok(self.page()?.delete(slot)?)
    }

    pub fn rid(&self) -> Result<Rid, QueryError> {
        let slot = self.positioned_slot()?;
        Ok(Rid::new(self.current_block()?.number(), slot))
    }

    pub fn move_to_rid(&mut self, rid: Rid) -> Result<(), QueryError> {
        self.move_to_block(rid.block)?;
        self.current_slot = Some(rid.slot);
        Ok(())
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.layout.schema().has_field(field)
    }

    pub fn schema(&self) -> &cranedb_core::Schema {
        self.layout.schema()
    }

    /// Unpin the current page. The scan is unusable afterwards.
    pub fn close(&mut self) -> Result<(), QueryError> {
        if let Some(page) = self.page.take() {
            page.close()?;
        }
        Ok(())
    }

    fn move_to_block(&mut self, number: BlockNum) -> Result<(), QueryError> {
        self.close()?;

        let block = BlockId::new(self.file_name.clone(), number);
        self.page = Some(RecordPage::new(
            Arc::clone(&self.tx),
            block,
            self.layout.clone(),
        )?);
        self.current_slot = None;

        Ok(())
    }

    fn move_to_new_block(&mut self) -> Result<(), QueryError> {
        self.close()?;

        let block = self.tx.append_block(&self.file_name)?;
        let page = RecordPage::new(Arc::clone(&self.tx), block, self.layout.clone())?;
        page.format()?;

        self.page = Some(page);
        self.current_slot = None;

        Ok(())
    }

    fn at_last_block(&self) -> Result<bool, QueryError> {
        let count = self.tx.block_count(&self.file_name)?;
        Ok(self.current_block()?.number() + 1 == count)
    }

    fn current_block(&self) -> Result<&BlockId, QueryError> {
        Ok(self.page()?.block())
    }

    fn page(&self) -> Result<&RecordPage, QueryError> {
        self.page
            .as_ref()
            .ok_or_else(|| StorageError::corrupt("table scan used after close").into())
    }

    fn positioned_slot(&self) -> Result<SlotId, QueryError> {
        self.current_slot
            .ok_or_else(|| StorageError::corrupt("table scan not positioned on a record").into())
    }

    fn field_type(&self, field: &str) -> Result<SqlType, QueryError> {
        self.layout
            .schema()
            .sql_type(field)
            .ok_or_else(|| QueryError::UnknownField(field.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferManager;
    use crate::concurrency::LockTable;
    use crate::file::FileManager;
    use crate::log::LogManager;
    use cranedb_core::Schema;
    use std::time::Duration;

    fn layout() -> Layout {
        let mut schema = Schema::new();
        schema.add_int_field("a");
        schema.add_string_field("b", 9);
        Layout::new(schema)
    }

    fn tx() -> (tempfile::TempDir, Arc<Transaction>) {
        let dir = tempfile::tempdir().unwrap();
        let fm = Arc::new(FileManager::new(dir.path().join("db"), 120).unwrap());
        let lm = Arc::new(LogManager::new(Arc::clone(&fm), "cranedb.log").unwrap());
        let bm = Arc::new(BufferManager::new(
            Arc::clone(&fm),
            Arc::clone(&lm),
            4,
            Duration::from_secs(1),
        ));
        let locks = Arc::new(LockTable::new(Duration::from_secs(1)));
        (dir, Arc::new(Transaction::new(fm, lm, bm, locks).unwrap()))
    }

    #[test]
    fn insert_and_scan_across_blocks() {
        let (_dir, tx) = tx();
        // 120-byte blocks with 21-byte slots: five records per block
        let mut scan = TableScan::new(Arc::clone(&tx), "t", layout()).unwrap();

        for n in 0..23 {
            scan.insert().unwrap();
            scan.set_int("a", n).unwrap();
            scan.set_string("b", &format!("rec{n}")).unwrap();
        }

        assert!(tx.block_count("t.tbl").unwrap() > 1);

        scan.before_first().unwrap();
        let mut seen = Vec::new();
        while scan.next().unwrap() {
            seen.push(scan.get_int("a").unwrap());
        }
        assert_eq!(seen, (0..23).collect::<Vec<_>>());

        scan.close().unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn delete_hides_records() {
        let (_dir, tx) = tx();
        let mut scan = TableScan::new(Arc::clone(&tx), "t", layout()).unwrap();

        for n in 0..4 {
            scan.insert().unwrap();
            scan.set_int("a", n).unwrap();
        }

        scan.before_first().unwrap();
        while scan.next().unwrap() {
            if scan.get_int("a").unwrap() % 2 == 0 {
                scan.delete().unwrap();
            }
        }

        scan.before_first().unwrap();
        let mut seen = Vec::new();
        while scan.next().unwrap() {
            seen.push(scan.get_int("a").unwrap());
        }
        assert_eq!(seen, vec![1, 3]);

        scan.close().unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn rids_navigate_back_to_records() {
        let (_dir, tx) = tx();
        let mut scan = TableScan::new(Arc::clone(&tx), "t", layout()).unwrap();

        let mut rids = Vec::new();
        for n in 0..12 {
            scan.insert().unwrap();
            scan.set_int("a", n).unwrap();
            rids.push(scan.rid().unwrap());
        }

        scan.move_to_rid(rids[7]).unwrap();
        assert_eq!(scan.get_int("a").unwrap(), 7);
        assert_eq!(scan.get_value("a").unwrap(), Value::Int(7));

        scan.close().unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn setters_enforce_field_types() {
        let (_dir, tx) = tx();
        let mut scan = TableScan::new(Arc::clone(&tx), "t", layout()).unwrap();
        scan.insert().unwrap();

        assert!(matches!(
            scan.set_int("b", 1).unwrap_err(),
            QueryError::TypeMismatch(_)
        ));
        assert!(matches!(
            scan.set_string("a", "x").unwrap_err(),
            QueryError::TypeMismatch(_)
        ));
        assert!(matches!(
            scan.get_value("zz").unwrap_err(),
            QueryError::UnknownField(_)
        ));

        scan.close().unwrap();
        tx.commit().unwrap();
    }
}
