use std::sync::{Arc, Mutex};

use cranedb_core::{BlockId, Lsn, StorageError};
use tracing::trace;

use crate::file::FileManager;
use crate::page::Page;

/// Append-only log over one file. Records fill each block downward from
/// `block_size` toward a boundary pointer kept in the block's first four
/// bytes, so the newest record sits at the boundary and a forward walk from
/// it yields newest to oldest.
#[derive(Debug)]
pub struct LogManager {
    fm: Arc<FileManager>,
    log_file: String,
    state: Mutex<LogState>,
}

#[derive(Debug)]
struct LogState {
    page: Page,
    current_block: BlockId,
    latest_lsn: Lsn,
    last_saved_lsn: Lsn,
}

impl LogManager {
    pub fn new(fm: Arc<FileManager>, log_file: &str) -> Result<Self, StorageError> {
        let mut page = Page::new(fm.block_size());

        let block_count = fm.block_count(log_file)?;
        let current_block = if block_count == 0 {
            extend_log(&fm, log_file, &mut page)?
        } else {
            let block = BlockId::new(log_file, block_count - 1);
            fm.read(&block, &mut page)?;
            block
        };

        Ok(Self {
            fm,
            log_file: log_file.to_string(),
            state: Mutex::new(LogState {
                page,
                current_block,
                latest_lsn: 0,
                last_saved_lsn: 0,
            }),
        })
    }

    /// Append one record and return its LSN. The record is only guaranteed
    /// on disk after a `flush` covering that LSN, or when the block fills
    /// and spills.
    pub fn append(&self, record: &[u8]) -> Result<Lsn, StorageError> {
        let mut state = self.state.lock().unwrap();

        let mut boundary = state.page.get_int(0) as usize;
        let bytes_needed = record.len() + 4;

        if bytes_needed + 4 > self.fm.block_size() {
            return Err(StorageError::corrupt(format!(
                "log record of {} bytes cannot fit one block",
                record.len()
            )));
        }

        if boundary < bytes_needed + 4 {
            self.write_tail(&mut state)?;
            state.current_block = extend_log(&self.fm, &self.log_file, &mut state.page)?;
            boundary = state.page.get_int(0) as usize;
        }

        let record_pos = boundary - bytes_needed;
        state.page.set_bytes(record_pos, record);
        state.page.set_int(0, record_pos as i32);

        state.latest_lsn += 1;
        trace!(lsn = state.latest_lsn, len = record.len(), "log append");

        Ok(state.latest_lsn)
    }

    /// Ensure every record up to and including the given LSN is on disk.
    pub fn flush(&self, lsn: Lsn) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();

        if lsn > state.last_saved_lsn {
            self.write_tail(&mut state)?;
        }

        Ok(())
    }

    /// Iterate records newest to oldest. Flushes the tail block first so
    /// the iterator sees every appended record.
    pub fn iter(&self) -> Result<LogIterator, StorageError> {
        let mut state = self.state.lock().unwrap();
        self.write_tail(&mut state)?;

        LogIterator::new(Arc::clone(&self.fm), state.current_block.clone())
    }

    fn write_tail(&self, state: &mut LogState) -> Result<(), StorageError> {
        self.fm.write(&state.current_block, &state.page)?;
        state.last_saved_lsn = state.latest_lsn;
        Ok(())
    }
}

/// Append a zeroed block to the log file and format its boundary.
fn extend_log(
    fm: &FileManager,
    log_file: &str,
    page: &mut Page,
) -> Result<BlockId, StorageError> {
    let block = fm.append(log_file)?;

    page.clear();
    page.set_int(0, fm.block_size() as i32);
    fm.write(&block, page)?;

    Ok(block)
}

/// Reverse iterator over log records: newest to oldest within a block, then
/// block by block down to block zero.
pub struct LogIterator {
    fm: Arc<FileManager>,
    block: BlockId,
    page: Page,
    current_pos: usize,
}

impl LogIterator {
    fn new(fm: Arc<FileManager>, block: BlockId) -> Result<Self, StorageError> {
        let mut page = Page::new(fm.block_size());
        fm.read(&block, &mut page)?;
        let current_pos = page.get_int(0) as usize;

        Ok(Self {
            fm,
            block,
            page,
            current_pos,
        })
    }

    fn move_to_previous_block(&mut self) -> Result<(), StorageError> {
        self.block = BlockId::new(self.block.file_name(), self.block.number() - 1);
        self.fm.read(&self.block, &mut self.page)?;
        self.current_pos = self.page.get_int(0) as usize;
        Ok(())
    }
}

impl Iterator for LogIterator {
    type Item = Result<Vec<u8>, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.current_pos >= self.page.block_size() {
            if self.block.number() == 0 {
                return None;
            }
            if let Err(e) = self.move_to_previous_block() {
                return Some(Err(e));
            }
        }

        let record = self.page.get_bytes(self.current_pos).to_vec();
        self.current_pos += 4 + record.len();

        Some(Ok(record))
    }
}
