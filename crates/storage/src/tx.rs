use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use cranedb_core::{BlockId, BlockNum, StorageError, TxId};
use tracing::{debug, info};

use crate::buffer::{BufferManager, FrameId};
use crate::concurrency::{ConcurrencyManager, LockTable};
use crate::file::FileManager;
use crate::log::LogManager;
use crate::recovery::LogRecord;

static NEXT_TX: AtomicI32 = AtomicI32::new(1);

/// One ACID transaction. Reads take shared locks, writes take exclusive
/// locks and log their before-image first (write-ahead logging), and every
/// lock is held until commit or rollback (strict two-phase locking).
///
/// The shared managers are handed in as `Arc` handles; the transaction's
/// private state sits behind an internal mutex so scans can share one
/// transaction through an `Arc`.
#[derive(Debug)]
pub struct Transaction {
    fm: Arc<FileManager>,
    lm: Arc<LogManager>,
    bm: Arc<BufferManager>,
    tx_id: TxId,
    inner: Mutex<TxInner>,
}

#[derive(Debug)]
struct TxInner {
    concurrency: ConcurrencyManager,
    buffers: BufferList,
    finished: bool,
}

impl Transaction {
    /// Start a new transaction, appending its start record to the log.
    pub fn new(
        fm: Arc<FileManager>,
        lm: Arc<LogManager>,
        bm: Arc<BufferManager>,
        locks: Arc<LockTable>,
    ) -> Result<Self, StorageError> {
        let tx_id = NEXT_TX.fetch_add(1, Ordering::SeqCst);
        lm.append(&LogRecord::Start { tx: tx_id }.to_bytes())?;

        Ok(Self {
            fm,
            lm,
            bm: Arc::clone(&bm),
            tx_id,
            inner: Mutex::new(TxInner {
                concurrency: ConcurrencyManager::new(locks),
                buffers: BufferList::new(bm),
                finished: false,
            }),
        })
    }

    pub fn id(&self) -> TxId {
        self.tx_id
    }

    pub fn block_size(&self) -> usize {
        self.fm.block_size()
    }

    pub fn available_buffers(&self) -> usize {
        self.bm.available()
    }

    /// Pin the block into this transaction's buffer list.
    pub fn pin(&self, block: &BlockId) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        self.check_active(&inner)?;
        inner.buffers.pin(block)?;
        Ok(())
    }

    pub fn unpin(&self, block: &BlockId) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.buffers.unpin(block)
    }

    /// Read an integer under a shared lock. The block must be pinned.
    pub fn get_int(&self, block: &BlockId, offset: usize) -> Result<i32, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        self.check_active(&inner)?;
        inner.concurrency.slock(block)?;

        let frame = inner.buffers.frame(block).ok_or_else(|| not_pinned(block))?;
        Ok(self.bm.read_page(frame, |p| p.get_int(offset)))
    }

    pub fn get_string(&self, block: &BlockId, offset: usize) -> Result<String, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        self.check_active(&inner)?;
        inner.concurrency.slock(block)?;

        let frame = inner.buffers.frame(block).ok_or_else(|| not_pinned(block))?;
        self.bm.read_page(frame, |p| p.get_string(offset))
    }

    /// Write an integer under an exclusive lock. When `log` is set, the
    /// before-image is appended to the log before the page changes; undo
    /// passes it back with `log` off.
    pub fn set_int(
        &self,
        block: &BlockId,
        offset: usize,
        value: i32,
        log: bool,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        self.check_active(&inner)?;
        inner.concurrency.xlock(block)?;

        let frame = inner.buffers.frame(block).ok_or_else(|| not_pinned(block))?;

        let lsn = if log {
            let old = self.bm.read_page(frame, |p| p.get_int(offset));
            let record = LogRecord::SetInt {
                tx: self.tx_id,
                block: block.clone(),
                offset,
                old,
            };
            Some(self.lm.append(&record.to_bytes())?)
        } else {
            None
        };

        self.bm
            .modify_page(frame, self.tx_id, lsn, |p| p.set_int(offset, value));
        Ok(())
    }

    pub fn set_string(
        &self,
        block: &BlockId,
        offset: usize,
        value: &str,
        log: bool,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        self.check_active(&inner)?;
        inner.concurrency.xlock(block)?;

        let frame = inner.buffers.frame(block).ok_or_else(|| not_pinned(block))?;

        let lsn = if log {
            let old = self.bm.read_page(frame, |p| p.get_string(offset))?;
            let record = LogRecord::SetString {
                tx: self.tx_id,
                block: block.clone(),
                offset,
                old,
            };
            Some(self.lm.append(&record.to_bytes())?)
        } else {
            None
        };

        self.bm
            .modify_page(frame, self.tx_id, lsn, |p| p.set_string(offset, value));
        Ok(())
    }

    /// Number of blocks in the file, under a shared lock on the end-of-file
    /// marker so concurrent appends serialize against the answer.
    pub fn block_count(&self, file_name: &str) -> Result<BlockNum, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        self.check_active(&inner)?;
        inner.concurrency.slock(&BlockId::eof_marker(file_name))?;

        self.fm.block_count(file_name)
    }

    /// Extend the file by one zeroed block, under an exclusive lock on the
    /// end-of-file marker.
    pub fn append_block(&self, file_name: &str) -> Result<BlockId, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        self.check_active(&inner)?;
        inner.concurrency.xlock(&BlockId::eof_marker(file_name))?;

        self.fm.append(file_name)
    }

    /// Flush this transaction's buffers and its log records, append a
    /// commit record, then release every lock and pin. Terminal.
    pub fn commit(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        self.check_active(&inner)?;

        self.bm.flush_all(self.tx_id)?;
        let lsn = self.lm.append(&LogRecord::Commit { tx: self.tx_id }.to_bytes())?;
        self.lm.flush(lsn)?;

        self.finish(&mut inner);
        debug!(tx = self.tx_id, "transaction committed");
        Ok(())
    }

    /// Undo every change this transaction logged, append a rollback record,
    /// then release every lock and pin. Terminal.
    pub fn rollback(&self) -> Result<(), StorageError> {
        {
            let inner = self.inner.lock().unwrap();
            self.check_active(&inner)?;
        }

        for record in self.lm.iter()? {
            let record = LogRecord::from_bytes(&record?)?;
            if record.tx() != Some(self.tx_id) {
                continue;
            }
            if matches!(record, LogRecord::Start { .. }) {
                break;
            }
            self.undo(&record)?;
        }

        let mut inner = self.inner.lock().unwrap();
        self.bm.flush_all(self.tx_id)?;
        let lsn = self
            .lm
            .append(&LogRecord::Rollback { tx: self.tx_id }.to_bytes())?;
        self.lm.flush(lsn)?;

        self.finish(&mut inner);
        debug!(tx = self.tx_id, "transaction rolled back");
        Ok(())
    }

    /// Undo every change of every unfinished transaction, stopping at the
    /// most recent checkpoint, then write a fresh checkpoint. Run at
    /// startup on a fresh transaction before any user work begins.
    pub fn recover(&self) -> Result<(), StorageError> {
        info!(tx = self.tx_id, "recovering database");

        let mut finished: HashSet<TxId> = HashSet::new();
        for record in self.lm.iter()? {
            let record = LogRecord::from_bytes(&record?)?;
            match &record {
                LogRecord::Checkpoint => break,
                LogRecord::Commit { tx } | LogRecord::Rollback { tx } => {
                    finished.insert(*tx);
                }
                LogRecord::Start { .. } => {}
                LogRecord::SetInt { tx, .. } | LogRecord::SetString { tx, .. } => {
                    if !finished.contains(tx) {
                        self.undo(&record)?;
                    }
                }
            }
        }

        self.bm.flush_all(self.tx_id)?;
        let lsn = self.lm.append(&LogRecord::Checkpoint.to_bytes())?;
        self.lm.flush(lsn)?;

        Ok(())
    }

    /// Write a logged before-image back without logging the write itself.
    fn undo(&self, record: &LogRecord) -> Result<(), StorageError> {
        match record {
            LogRecord::SetInt {
                block, offset, old, ..
            } => {
                self.pin(block)?;
                self.set_int(block, *offset, *old, false)?;
                self.unpin(block)?;
            }
            LogRecord::SetString {
                block, offset, old, ..
            } => {
                self.pin(block)?;
                self.set_string(block, *offset, old, false)?;
                self.unpin(block)?;
            }
            _ => {}
        }

        Ok(())
    }

    fn finish(&self, inner: &mut TxInner) {
        inner.concurrency.release();
        inner.buffers.unpin_all();
        inner.finished = true;
    }

    fn check_active(&self, inner: &TxInner) -> Result<(), StorageError> {
        if inner.finished {
            return Err(StorageError::TxTerminated(self.tx_id));
        }
        Ok(())
    }
}

fn not_pinned(block: &BlockId) -> StorageError {
    StorageError::corrupt(format!("block {block} accessed without a pin"))
}

/// The blocks a transaction currently has pinned, with per-block pin
/// counts. Every pin here is mirrored by a pin on the underlying frame, so
/// `unpin_all` can balance the pool exactly.
#[derive(Debug)]
struct BufferList {
    bm: Arc<BufferManager>,
    pins: HashMap<BlockId, PinnedBlock>,
}

#[derive(Debug)]
struct PinnedBlock {
    frame: FrameId,
    count: u32,
}

impl BufferList {
    fn new(bm: Arc<BufferManager>) -> Self {
        Self {
            bm,
            pins: HashMap::new(),
        }
    }

    fn pin(&mut self, block: &BlockId) -> Result<FrameId, StorageError> {
        let frame = self.bm.pin(block)?;

        let entry = self.pins.entry(block.clone()).or_insert(PinnedBlock {
            frame,
            count: 0,
        });
        entry.frame = frame;
        entry.count += 1;

        Ok(frame)
    }

    fn unpin(&mut self, block: &BlockId) -> Result<(), StorageError> {
        let Some(entry) = self.pins.get_mut(block) else {
            return Err(StorageError::corrupt(format!(
                "unpinning block {block} that this transaction never pinned"
            )));
        };

        self.bm.unpin(entry.frame);
        entry.count -= 1;
        if entry.count == 0 {
            self.pins.remove(block);
        }

        Ok(())
    }

    fn frame(&self, block: &BlockId) -> Option<FrameId> {
        self.pins.get(block).map(|e| e.frame)
    }

    fn unpin_all(&mut self) {
        for entry in self.pins.values() {
            for _ in 0..entry.count {
                self.bm.unpin(entry.frame);
            }
        }
        self.pins.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Harness {
        _dir: tempfile::TempDir,
        fm: Arc<FileManager>,
        lm: Arc<LogManager>,
        bm: Arc<BufferManager>,
        locks: Arc<LockTable>,
    }

    impl Harness {
        fn new(wait: Duration) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let fm = Arc::new(FileManager::new(dir.path().join("db"), 400).unwrap());
            let lm = Arc::new(LogManager::new(Arc::clone(&fm), "cranedb.log").unwrap());
            let bm = Arc::new(BufferManager::new(
                Arc::clone(&fm),
                Arc::clone(&lm),
                8,
                wait,
            ));
            let locks = Arc::new(LockTable::new(wait));

            Self {
                _dir: dir,
                fm,
                lm,
                bm,
                locks,
            }
        }

        fn tx(&self) -> Transaction {
            Transaction::new(
                Arc::clone(&self.fm),
                Arc::clone(&self.lm),
                Arc::clone(&self.bm),
                Arc::clone(&self.locks),
            )
            .unwrap()
        }
    }

    #[test]
    fn committed_writes_are_visible_to_later_transactions() {
        let h = Harness::new(Duration::from_secs(1));

        let tx = h.tx();
        let block = tx.append_block("t.tbl").unwrap();
        tx.pin(&block).unwrap();
        tx.set_int(&block, 80, 1, true).unwrap();
        tx.set_string(&block, 40, "one", true).unwrap();
        tx.commit().unwrap();

        let tx = h.tx();
        tx.pin(&block).unwrap();
        assert_eq!(tx.get_int(&block, 80).unwrap(), 1);
        assert_eq!(tx.get_string(&block, 40).unwrap(), "one");
        tx.commit().unwrap();
    }

    #[test]
    fn rollback_restores_before_images() {
        let h = Harness::new(Duration::from_secs(1));

        let tx = h.tx();
        let block = tx.append_block("t.tbl").unwrap();
        tx.pin(&block).unwrap();
        tx.set_int(&block, 80, 1, true).unwrap();
        tx.commit().unwrap();

        let tx = h.tx();
        tx.pin(&block).unwrap();
        tx.set_int(&block, 80, 2, true).unwrap();
        assert_eq!(tx.get_int(&block, 80).unwrap(), 2);
        tx.rollback().unwrap();

        let tx = h.tx();
        tx.pin(&block).unwrap();
        assert_eq!(tx.get_int(&block, 80).unwrap(), 1);
        tx.commit().unwrap();
    }

    #[test]
    fn terminated_transactions_reject_further_work() {
        let h = Harness::new(Duration::from_secs(1));

        let tx = h.tx();
        let block = tx.append_block("t.tbl").unwrap();
        tx.commit().unwrap();

        assert!(matches!(
            tx.pin(&block).unwrap_err(),
            StorageError::TxTerminated(_)
        ));
        assert!(matches!(
            tx.commit().unwrap_err(),
            StorageError::TxTerminated(_)
        ));
    }

    #[test]
    fn writers_exclude_readers_until_commit() {
        let h = Harness::new(Duration::from_millis(50));

        let setup = h.tx();
        let block = setup.append_block("t.tbl").unwrap();
        setup.commit().unwrap();

        let writer = h.tx();
        writer.pin(&block).unwrap();
        writer.set_int(&block, 0, 5, true).unwrap();

        let reader = h.tx();
        reader.pin(&block).unwrap();
        let err = reader.get_int(&block, 0).unwrap_err();
        assert!(matches!(err, StorageError::LockAbort(_)));
        reader.rollback().unwrap();

        writer.commit().unwrap();

        let reader = h.tx();
        reader.pin(&block).unwrap();
        assert_eq!(reader.get_int(&block, 0).unwrap(), 5);
        reader.commit().unwrap();
    }

    #[test]
    fn recover_undoes_unfinished_transactions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");

        let block;
        {
            let fm = Arc::new(FileManager::new(&path, 400).unwrap());
            let lm = Arc::new(LogManager::new(Arc::clone(&fm), "cranedb.log").unwrap());
            let bm = Arc::new(BufferManager::new(
                Arc::clone(&fm),
                Arc::clone(&lm),
                8,
                Duration::from_secs(1),
            ));
            let locks = Arc::new(LockTable::new(Duration::from_secs(1)));

            let tx = Transaction::new(
                Arc::clone(&fm),
                Arc::clone(&lm),
                Arc::clone(&bm),
                Arc::clone(&locks),
            )
            .unwrap();
            block = tx.append_block("t.tbl").unwrap();
            tx.pin(&block).unwrap();
            tx.set_int(&block, 80, 100, true).unwrap();
            tx.commit().unwrap();

            // a second transaction modifies the block, flushes the dirty
            // page to disk, and then the process "crashes" before commit
            let tx = Transaction::new(fm, lm, Arc::clone(&bm), locks).unwrap();
            tx.pin(&block).unwrap();
            tx.set_int(&block, 80, 999, true).unwrap();
            bm.flush_all(tx.id()).unwrap();
        }

        let fm = Arc::new(FileManager::new(&path, 400).unwrap());
        let lm = Arc::new(LogManager::new(Arc::clone(&fm), "cranedb.log").unwrap());
        let bm = Arc::new(BufferManager::new(
            Arc::clone(&fm),
            Arc::clone(&lm),
            8,
            Duration::from_secs(1),
        ));
        let locks = Arc::new(LockTable::new(Duration::from_secs(1)));

        let tx = Transaction::new(fm, lm, bm, locks).unwrap();
        tx.recover().unwrap();
        tx.pin(&block).unwrap();
        assert_eq!(tx.get_int(&block, 80).unwrap(), 100);
        tx.commit().unwrap();
    }
}
