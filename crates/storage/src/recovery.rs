use cranedb_core::{BlockId, BlockNum, StorageError, TxId};

use crate::page::Page;

/// Tags identifying each record kind in the serialized form.
const CHECKPOINT: i32 = 0;
const START: i32 = 1;
const COMMIT: i32 = 2;
const ROLLBACK: i32 = 3;
const SET_INT: i32 = 4;
const SET_STRING: i32 = 5;

/// One entry in the write-ahead log. Set records carry the before-image so
/// recovery can undo them; the log is undo-only, so no after-images exist.
///
/// Serialized layout: a 32-bit tag, then the transaction number, then for
/// set records the block (length-prefixed file name plus u32 number), the
/// offset, and the old value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Checkpoint,
    Start {
        tx: TxId,
    },
    Commit {
        tx: TxId,
    },
    Rollback {
        tx: TxId,
    },
    SetInt {
        tx: TxId,
        block: BlockId,
        offset: usize,
        old: i32,
    },
    SetString {
        tx: TxId,
        block: BlockId,
        offset: usize,
        old: String,
    },
}

impl LogRecord {
    /// The transaction the record belongs to; checkpoints belong to none.
    pub fn tx(&self) -> Option<TxId> {
        match self {
            LogRecord::Checkpoint => None,
            LogRecord::Start { tx }
            | LogRecord::Commit { tx }
            | LogRecord::Rollback { tx }
            | LogRecord::SetInt { tx, .. }
            | LogRecord::SetString { tx, .. } => Some(*tx),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            LogRecord::Checkpoint => {
                let mut page = Page::new(4);
                page.set_int(0, CHECKPOINT);
                page.into_vec()
            }
            LogRecord::Start { tx } => tx_only_record(START, *tx),
            LogRecord::Commit { tx } => tx_only_record(COMMIT, *tx),
            LogRecord::Rollback { tx } => tx_only_record(ROLLBACK, *tx),
            LogRecord::SetInt {
                tx,
                block,
                offset,
                old,
            } => {
                let value_pos = set_record_prefix_len(block);
                let mut page = Page::new(value_pos + 4);
                let pos = write_set_record_prefix(&mut page, SET_INT, *tx, block, *offset);
                page.set_int(pos, *old);
                page.into_vec()
            }
            LogRecord::SetString {
                tx,
                block,
                offset,
                old,
            } => {
                let value_pos = set_record_prefix_len(block);
                let mut page = Page::new(value_pos + Page::max_length(old.len()));
                let pos = write_set_record_prefix(&mut page, SET_STRING, *tx, block, *offset);
                page.set_string(pos, old);
                page.into_vec()
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let page = Page::from_vec(bytes.to_vec());

        let record = match page.get_int(0) {
            CHECKPOINT => LogRecord::Checkpoint,
            START => LogRecord::Start { tx: page.get_int(4) },
            COMMIT => LogRecord::Commit { tx: page.get_int(4) },
            ROLLBACK => LogRecord::Rollback { tx: page.get_int(4) },
            SET_INT => {
                let (tx, block, offset, value_pos) = read_set_record_prefix(&page)?;
                LogRecord::SetInt {
                    tx,
                    block,
                    offset,
                    old: page.get_int(value_pos),
                }
            }
            SET_STRING => {
                let (tx, block, offset, value_pos) = read_set_record_prefix(&page)?;
                LogRecord::SetString {
                    tx,
                    block,
                    offset,
                    old: page.get_string(value_pos)?,
                }
            }
            tag => {
                return Err(StorageError::corrupt(format!("unknown log record tag {tag}")));
            }
        };

        Ok(record)
    }
}

fn tx_only_record(tag: i32, tx: TxId) -> Vec<u8> {
    let mut page = Page::new(8);
    page.set_int(0, tag);
    page.set_int(4, tx);
    page.into_vec()
}

/// Bytes occupied by tag, tx, block identity, and offset of a set record.
fn set_record_prefix_len(block: &BlockId) -> usize {
    4 + 4 + Page::max_length(block.file_name().len()) + 4 + 4
}

/// Write the common head of a set record and return the position where the
/// old value goes.
fn write_set_record_prefix(
    page: &mut Page,
    tag: i32,
    tx: TxId,
    block: &BlockId,
    offset: usize,
) -> usize {
    page.set_int(0, tag);
    page.set_int(4, tx);
    page.set_string(8, block.file_name());

    let num_pos = 8 + Page::max_length(block.file_name().len());
    page.set_int(num_pos, block.number() as i32);
    page.set_int(num_pos + 4, offset as i32);

    num_pos + 8
}

fn read_set_record_prefix(page: &Page) -> Result<(TxId, BlockId, usize, usize), StorageError> {
    let tx = page.get_int(4);
    let file_name = page.get_string(8)?;

    let num_pos = 8 + Page::max_length(file_name.len());
    let number = page.get_int(num_pos) as u32 as BlockNum;
    let offset = page.get_int(num_pos + 4) as usize;

    Ok((tx, BlockId::new(file_name, number), offset, num_pos + 8))
}
