use std::sync::Arc;

use cranedb_core::{BlockId, Layout, SlotId, SqlType, StorageError};

use crate::tx::Transaction;

/// Slot status values. Anything else on disk is corruption.
const EMPTY: i32 = 0;
const IN_USE: i32 = 1;

/// A block formatted as a sequence of fixed-size record slots. Slot `i`
/// occupies `[i * slot_size, (i + 1) * slot_size)`; the first four bytes of
/// each slot are its status cell. The page pins its block for as long as it
/// lives and relies on the transaction for locking and logging.
#[derive(Debug)]
pub struct RecordPage {
    tx: Arc<Transaction>,
    block: BlockId,
    layout: Layout,
}

impl RecordPage {
    pub fn new(tx: Arc<Transaction>, block: BlockId, layout: Layout) -> Result<Self, StorageError> {
        tx.pin(&block)?;
        Ok(Self { tx, block, layout })
    }

    pub fn block(&self) -> &BlockId {
        &self.block
    }

    /// Unpin the underlying block.
    pub fn close(self) -> Result<(), StorageError> {
        self.tx.unpin(&self.block)
    }

    /// Mark every valid slot empty and zero every field. The formatting
    /// writes are not logged; a fresh block has no before-image worth
    /// keeping.
    pub fn format(&self) -> Result<(), StorageError> {
        let mut slot = 0;
        while self.is_valid_slot(slot) {
            self.tx
                .set_int(&self.block, self.slot_offset(slot), EMPTY, false)?;

            for field in self.layout.schema().fields() {
                let offset = self.field_offset(slot, field)?;
                match self.sql_type(field)? {
                    SqlType::Int => self.tx.set_int(&self.block, offset, 0, false)?,
                    SqlType::Varchar => self.tx.set_string(&self.block, offset, "", false)?,
                }
            }

            slot += 1;
        }

        Ok(())
    }

    pub fn get_int(&self, slot: SlotId, field: &str) -> Result<i32, StorageError> {
        let offset = self.field_offset(slot, field)?;
        self.tx.get_int(&self.block, offset)
    }

    pub fn get_string(&self, slot: SlotId, field: &str) -> Result<String, StorageError> {
        let offset = self.field_offset(slot, field)?;
        self.tx.get_string(&self.block, offset)
    }

    pub fn set_int(&self, slot: SlotId, field: &str, value: i32) -> Result<(), StorageError> {
        let offset = self.field_offset(slot, field)?;
        self.tx.set_int(&self.block, offset, value, true)
    }

    pub fn set_string(&self, slot: SlotId, field: &str, value: &str) -> Result<(), StorageError> {
        let offset = self.field_offset(slot, field)?;
        self.tx.set_string(&self.block, offset, value, true)
    }

    /// Mark the slot empty. The record bytes stay behind until the slot is
    /// reused.
    pub fn delete(&self, slot: SlotId) -> Result<(), StorageError> {
        self.tx
            .set_int(&self.block, self.slot_offset(slot), EMPTY, true)
    }

    /// The smallest in-use slot after the given one, scanning from the
    /// page start when `after` is `None`.
    pub fn next_used_slot(&self, after: Option<SlotId>) -> Result<Option<SlotId>, StorageError> {
        self.search_after(after, IN_USE)
    }

    /// Claim the smallest empty slot after the given one, marking it
    /// in-use. `None` when the page is full.
    pub fn insert_slot(&self, after: Option<SlotId>) -> Result<Option<SlotId>, StorageError> {
        let slot = self.search_after(after, EMPTY)?;

        if let Some(slot) = slot {
            self.tx
                .set_int(&self.block, self.slot_offset(slot), IN_USE, true)?;
        }

        Ok(slot)
    }

    fn search_after(
        &self,
        after: Option<SlotId>,
        status: i32,
    ) -> Result<Option<SlotId>, StorageError> {
        let mut slot = after.map(|s| s + 1).unwrap_or(0);

        while self.is_valid_slot(slot) {
            let found = self.tx.get_int(&self.block, self.slot_offset(slot))?;
            match found {
                EMPTY | IN_USE => {
                    if found == status {
                        return Ok(Some(slot));
                    }
                }
                other => {
                    return Err(StorageError::corrupt(format!(
                        "slot {slot} of {} has status {other}",
                        self.block
                    )));
                }
            }
            slot += 1;
        }

        Ok(None)
    }

    fn is_valid_slot(&self, slot: SlotId) -> bool {
        (slot + 1) * self.layout.slot_size() <= self.tx.block_size()
    }

    fn slot_offset(&self, slot: SlotId) -> usize {
        slot * self.layout.slot_size()
    }

    fn field_offset(&self, slot: SlotId, field: &str) -> Result<usize, StorageError> {
        let offset = self
            .layout
            .offset(field)
            .ok_or_else(|| StorageError::corrupt(format!("field {field} not in layout")))?;

        Ok(self.slot_offset(slot) + offset)
    }

    fn sql_type(&self, field: &str) -> Result<SqlType, StorageError> {
        self.layout
            .schema()
            .sql_type(field)
            .ok_or_else(|| StorageError::corrupt(format!("field {field} not in schema")))
    }
}
